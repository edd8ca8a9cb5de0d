use apptally_core::{
    DayKey, LoadStatus, RawWindow, SamplerConfig, Tracker, TrackerPaths, WindowSource,
};
use std::collections::VecDeque;
use std::fs;
use tempfile::tempdir;

/// Plays back one window list per tick, then an empty desktop.
struct Script {
    frames: VecDeque<Vec<RawWindow>>,
}

impl Script {
    fn new(frames: Vec<Vec<RawWindow>>) -> Box<dyn WindowSource> {
        Box::new(Self {
            frames: frames.into(),
        })
    }
}

impl WindowSource for Script {
    fn top_level_windows(&mut self) -> Vec<RawWindow> {
        self.frames.pop_front().unwrap_or_default()
    }
}

fn window(process: &str, title: &str) -> RawWindow {
    RawWindow::visible(process, title, 1024, 768)
}

#[test]
fn usage_follows_the_desktop_tick_by_tick() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths::in_dir(dir.path());
    let script = Script::new(vec![
        vec![window("chrome.exe", "Mail"), window("slack.exe", "general")],
        vec![window("chrome.exe", "Mail"), window("chrome.exe", "News")],
        vec![window("chrome.exe", "News")],
        vec![],
    ]);
    let (tracker, _) = Tracker::open(&paths, script, SamplerConfig::default());

    let reports: Vec<_> = (0..4).map(|_| tracker.sample_now().unwrap()).collect();

    assert_eq!(reports[3].processes, 0);
    assert_eq!(reports[3].counted, 0);
    let records = tracker.ledger().records_for(DayKey::today());
    assert_eq!(records["chrome.exe"].time, 3);
    assert_eq!(records["slack.exe"].time, 1);
    assert!(tracker.live_snapshot().unwrap().is_empty());
}

#[test]
fn highlighted_app_is_listed_first() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths::in_dir(dir.path());
    let mut frames = vec![vec![window("a.exe", "A"), window("b.exe", "B")]; 2];
    frames.extend(vec![vec![window("b.exe", "B")]; 3]);
    let (tracker, _) = Tracker::open(&paths, Script::new(frames), SamplerConfig::default());
    for _ in 0..5 {
        tracker.sample_now().unwrap();
    }

    tracker.toggle_highlight("a.exe").unwrap();
    let rows = tracker.project(DayKey::today());

    let order: Vec<_> = rows.iter().map(|r| r.process_name.as_str()).collect();
    assert_eq!(order, vec!["a.exe", "b.exe"]);
    assert_eq!(rows[0].seconds, 2);
    assert_eq!(rows[1].seconds, 5);
}

#[test]
fn removed_app_needs_explicit_add_to_come_back() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths::in_dir(dir.path());
    fs::write(&paths.config, r#"{"removed_apps": ["notepad.exe"]}"#).unwrap();
    let frames = vec![vec![window("notepad.exe", "todo.txt")]; 3];
    let (tracker, report) = Tracker::open(&paths, Script::new(frames), SamplerConfig::default());
    assert_eq!(report.config, LoadStatus::Loaded);

    tracker.sample_now().unwrap();
    assert!(!tracker.store().is_tracked("notepad.exe"));
    assert!(tracker.ledger().records_for(DayKey::today()).is_empty());

    tracker.add_tracked(["notepad.exe"]).unwrap();
    tracker.sample_now().unwrap();
    tracker.sample_now().unwrap();

    assert_eq!(
        tracker.ledger().records_for(DayKey::today())["notepad.exe"].time,
        2
    );
}

#[test]
fn failed_history_write_keeps_counts_in_memory() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths {
        config: dir.path().join("app_config.json"),
        usage: dir.path().join("history"),
    };
    fs::create_dir(&paths.usage).unwrap();
    let frames = vec![vec![window("game.exe", "Level 1")]; 2];
    let (tracker, report) = Tracker::open(&paths, Script::new(frames), SamplerConfig::default());
    assert!(report.usage.is_corrupt());

    let first = tracker.sample_now().unwrap();
    let second = tracker.sample_now().unwrap();

    assert!(!first.saved);
    assert!(!second.saved);
    assert_eq!(
        tracker.ledger().records_for(DayKey::today())["game.exe"].time,
        2
    );
}

#[test]
fn reload_never_drops_seconds_that_missed_the_disk() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths {
        config: dir.path().join("app_config.json"),
        usage: dir.path().join("history"),
    };
    fs::create_dir(&paths.usage).unwrap();
    let frames = vec![vec![window("game.exe", "Level 2")]; 2];
    let (tracker, _) = Tracker::open(&paths, Script::new(frames), SamplerConfig::default());
    tracker.sample_now().unwrap();
    tracker.sample_now().unwrap();

    assert!(tracker.reload().is_err());
    assert_eq!(
        tracker.ledger().records_for(DayKey::today())["game.exe"].time,
        2
    );

    fs::remove_dir(&paths.usage).unwrap();
    let report = tracker.reload().unwrap();
    assert_eq!(report.usage, LoadStatus::Loaded);
    assert_eq!(
        tracker.ledger().records_for(DayKey::today())["game.exe"].time,
        2
    );
}

#[test]
fn corrupt_documents_start_empty() {
    let dir = tempdir().unwrap();
    let paths = TrackerPaths::in_dir(dir.path());
    fs::write(&paths.config, "{\"tracked_apps\": [1, 2").unwrap();
    fs::write(&paths.usage, "[]").unwrap();

    let (tracker, report) = Tracker::open(&paths, Script::new(vec![]), SamplerConfig::default());

    assert!(report.config.is_corrupt());
    assert!(report.usage.is_corrupt());
    assert_eq!(tracker.classification(), Default::default());
    assert!(tracker.days().is_empty());
}
