use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::classification::{Classification, ClassificationStore};
use crate::day::DayKey;
use crate::ledger::UsageLedger;
use crate::lock;
use crate::persist::LoadStatus;
use crate::projection::{project, ProjectedRow};
use crate::sampler::{Sampler, SamplerConfig, TickReport};
use crate::window_source::{running_process_names, WindowSnapshot, WindowSource};

pub const CONFIG_FILE_NAME: &str = "app_config.json";
pub const USAGE_FILE_NAME: &str = "app_usage_data.json";

type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerPaths {
    pub config: PathBuf,
    pub usage: PathBuf,
}

impl TrackerPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE_NAME),
            usage: dir.join(USAGE_FILE_NAME),
        }
    }
}

impl Default for TrackerPaths {
    fn default() -> Self {
        Self {
            config: PathBuf::from(CONFIG_FILE_NAME),
            usage: PathBuf::from(USAGE_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub config: LoadStatus,
    pub usage: LoadStatus,
}

/// State shared between the sampling thread and the command thread.
pub(crate) struct Shared {
    pub(crate) store: ClassificationStore,
    pub(crate) ledger: UsageLedger,
    live: Mutex<Option<WindowSnapshot>>,
    refresh: Mutex<Option<RefreshCallback>>,
}

impl Shared {
    pub(crate) fn set_live(&self, snapshot: WindowSnapshot) {
        *lock(&self.live) = Some(snapshot);
    }

    fn live(&self) -> Option<WindowSnapshot> {
        lock(&self.live).clone()
    }

    pub(crate) fn notify_refresh(&self) {
        let callback = lock(&self.refresh).clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Entry point for front-ends: owns both stores and the sampling loop.
/// Every classification change and every completed tick fires the refresh
/// callback; the callback runs on the thread that caused the change and
/// should only hand off work (for example send on a channel).
pub struct Tracker {
    shared: Arc<Shared>,
    sampler: Sampler,
}

impl Tracker {
    pub fn open(
        paths: &TrackerPaths,
        source: Box<dyn WindowSource>,
        config: SamplerConfig,
    ) -> (Self, LoadReport) {
        let (store, config_status) = ClassificationStore::load(&paths.config);
        let (ledger, usage_status) = UsageLedger::load(&paths.usage);
        let shared = Arc::new(Shared {
            store,
            ledger,
            live: Mutex::new(None),
            refresh: Mutex::new(None),
        });
        let tracker = Self {
            shared,
            sampler: Sampler::new(source, config),
        };
        let report = LoadReport {
            config: config_status,
            usage: usage_status,
        };
        (tracker, report)
    }

    pub fn set_refresh(&self, callback: impl Fn() + Send + Sync + 'static) {
        *lock(&self.shared.refresh) = Some(Arc::new(callback));
    }

    pub fn store(&self) -> &ClassificationStore {
        &self.shared.store
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.shared.ledger
    }

    /// Returns `false` if sampling was already running.
    pub fn start(&self) -> Result<bool> {
        self.sampler.start(Arc::clone(&self.shared))
    }

    /// Returns `false` if sampling was already stopped.
    pub fn stop(&self) -> bool {
        self.sampler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.sampler.is_running()
    }

    /// Runs a single tick on the calling thread. Refused while the loop is
    /// running, since that tick would count the same second twice.
    pub fn sample_now(&self) -> Result<TickReport> {
        let report = self.sampler.sample_now(&self.shared)?;
        self.shared.notify_refresh();
        Ok(report)
    }

    pub fn project(&self, day: DayKey) -> Vec<ProjectedRow> {
        let classification = self.shared.store.snapshot();
        let records = self.shared.ledger.records_for(day);
        let live = self.shared.live();
        project(day, DayKey::today(), &classification, &records, live.as_ref())
    }

    pub fn live_snapshot(&self) -> Option<WindowSnapshot> {
        self.shared.live()
    }

    pub fn classification(&self) -> Classification {
        self.shared.store.snapshot()
    }

    pub fn days(&self) -> Vec<DayKey> {
        self.shared.ledger.days()
    }

    pub fn add_tracked<I, S>(&self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.classify(|store| store.add_tracked(names))
    }

    /// `label` may be a display alias or a process name. Returns the process
    /// name that was removed.
    pub fn remove_tracked(&self, label: &str) -> Result<String> {
        self.classify(|store| {
            let name = store.resolve_selection(label)?;
            store.remove_tracked(&name)?;
            Ok(name)
        })
    }

    pub fn rename(&self, label: &str, alias: &str) -> Result<String> {
        self.classify(|store| {
            let name = store.resolve_selection(label)?;
            store.rename(&name, alias)?;
            Ok(name)
        })
    }

    /// Returns the process name and its new highlight state.
    pub fn toggle_highlight(&self, label: &str) -> Result<(String, bool)> {
        self.classify(|store| {
            let name = store.resolve_selection(label)?;
            let highlighted = store.toggle_highlight(&name)?;
            Ok((name, highlighted))
        })
    }

    /// Fires the refresh callback whenever the classification changed, even
    /// if the change could not be saved.
    fn classify<T>(&self, change: impl FnOnce(&ClassificationStore) -> Result<T>) -> Result<T> {
        let store = &self.shared.store;
        let before = store.revision();
        let result = change(store);
        if store.revision() != before {
            self.shared.notify_refresh();
        }
        result
    }

    /// Untracked process names (running or currently windowed) whose name
    /// contains `filter`, case-insensitively.
    pub fn candidates(&self, filter: &str) -> Vec<String> {
        let mut seen = running_process_names();
        if let Some(live) = self.shared.live() {
            seen.extend(live.into_keys());
        }
        candidate_names(seen, &self.shared.store.snapshot(), filter)
    }

    /// Re-reads both documents. Refused while sampling runs, and a store
    /// whose pending changes cannot be written first is left untouched.
    pub fn reload(&self) -> Result<LoadReport> {
        let report = self.sampler.while_stopped(|| -> Result<LoadReport> {
            let usage = self.shared.ledger.reload()?;
            let config = self.shared.store.reload()?;
            Ok(LoadReport { config, usage })
        })??;
        self.shared.notify_refresh();
        Ok(report)
    }

    pub fn save(&self) -> Result<()> {
        let config = self.shared.store.save();
        let usage = self.shared.ledger.save();
        config?;
        usage
    }

    /// Stops sampling and writes both documents one last time.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();
        self.save()?;
        log::info!("tracker state flushed");
        Ok(())
    }
}

fn candidate_names(
    seen: impl IntoIterator<Item = String>,
    classification: &Classification,
    filter: &str,
) -> Vec<String> {
    let needle = filter.trim().to_lowercase();
    seen.into_iter()
        .filter(|name| !classification.is_tracked(name))
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
