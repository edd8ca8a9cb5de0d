use std::collections::{BTreeMap, BTreeSet};
use sysinfo::System;

/// Windows narrower or shorter than this are tooltips, overlays and the like.
pub const MIN_WINDOW_EDGE: i32 = 100;

/// Process name -> titles of its visible windows at one instant.
pub type WindowSnapshot = BTreeMap<String, BTreeSet<String>>;

/// One top-level window as reported by the platform, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    /// `None` when the owning process could not be resolved (it exited, or
    /// access was denied).
    pub process_name: Option<String>,
    pub title: String,
    pub visible: bool,
    pub width: i32,
    pub height: i32,
}

impl RawWindow {
    pub fn visible(process_name: &str, title: &str, width: i32, height: i32) -> Self {
        Self {
            process_name: Some(process_name.to_owned()),
            title: title.to_owned(),
            visible: true,
            width,
            height,
        }
    }
}

pub trait WindowSource: Send {
    fn top_level_windows(&mut self) -> Vec<RawWindow>;
}

/// Groups the usable windows by process. A window is dropped when it is
/// hidden, untitled, unresolvable, belongs to a removed process, or is
/// smaller than [`MIN_WINDOW_EDGE`] on either side.
pub fn collect_snapshot(
    windows: impl IntoIterator<Item = RawWindow>,
    is_removed: impl Fn(&str) -> bool,
) -> WindowSnapshot {
    let mut snapshot = WindowSnapshot::new();
    for window in windows {
        if !window.visible {
            continue;
        }
        let title = window.title.trim();
        if title.is_empty() {
            continue;
        }
        let Some(process_name) = window.process_name else {
            log::trace!("skipping window {title:?}: owner unresolved");
            continue;
        };
        if is_removed(&process_name) {
            continue;
        }
        if window.width < MIN_WINDOW_EDGE || window.height < MIN_WINDOW_EDGE {
            continue;
        }
        snapshot
            .entry(process_name)
            .or_default()
            .insert(title.to_owned());
    }
    snapshot
}

pub fn snapshot(
    source: &mut dyn WindowSource,
    is_removed: impl Fn(&str) -> bool,
) -> WindowSnapshot {
    collect_snapshot(source.top_level_windows(), is_removed)
}

/// Replays a fixed window list on every call. Useful headless and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticWindowSource {
    windows: Vec<RawWindow>,
}

impl StaticWindowSource {
    pub fn new(windows: Vec<RawWindow>) -> Self {
        Self { windows }
    }
}

impl WindowSource for StaticWindowSource {
    fn top_level_windows(&mut self) -> Vec<RawWindow> {
        self.windows.clone()
    }
}

/// Names of every running process, windowed or not.
pub fn running_process_names() -> BTreeSet<String> {
    let sys = System::new_all();
    sys.processes()
        .values()
        .map(|process| process.name().to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .collect()
}
