use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::day::DayKey;
use crate::lock;
use crate::persist::{DocumentFile, LoadStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Accumulated active seconds.
    pub time: u64,
    /// Epoch seconds of the latest tick that counted this process.
    #[serde(default)]
    pub last_seen: f64,
}

pub type DayRecords = BTreeMap<String, UsageRecord>;

type History = BTreeMap<DayKey, DayRecords>;

/// Day-bucketed usage history backed by the usage-history document.
pub struct UsageLedger {
    history: Mutex<History>,
    file: DocumentFile,
}

impl UsageLedger {
    pub fn load(path: impl Into<PathBuf>) -> (Self, LoadStatus) {
        let file = DocumentFile::new(path);
        let (history, status) = file.load::<History>();
        let ledger = Self {
            history: Mutex::new(history),
            file,
        };
        (ledger, status)
    }

    /// Replaces the history with the document on disk. Seconds that never
    /// reached disk are written first; if that fails nothing is replaced.
    pub fn reload(&self) -> Result<LoadStatus> {
        if self.file.has_unsaved_changes() {
            self.save()
                .context("usage history has unsaved seconds, not reloading")?;
        }
        let (history, status) = self.file.load::<History>();
        *lock(&self.history) = history;
        Ok(status)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.file.has_unsaved_changes()
    }

    pub fn save(&self) -> Result<()> {
        self.file.save_with(|| {
            let history = lock(&self.history);
            serde_json::to_vec_pretty(&*history).context("failed to serialize usage history")
        })
    }

    /// Counts one completed second for `name` on `day` and returns the new
    /// total.
    pub fn tick(&self, day: DayKey, name: &str, now: f64) -> u64 {
        let mut history = lock(&self.history);
        let record = history
            .entry(day)
            .or_default()
            .entry(name.to_owned())
            .or_default();
        record.time = record.time.saturating_add(1);
        record.last_seen = now;
        let total = record.time;
        self.file.mark_changed();
        total
    }

    pub fn records_for(&self, day: DayKey) -> DayRecords {
        lock(&self.history).get(&day).cloned().unwrap_or_default()
    }

    pub fn days(&self) -> Vec<DayKey> {
        lock(&self.history).keys().copied().collect()
    }
}

/// Renders whole seconds as `"{h}h {m}m {s}s"`, truncating.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours}h {minutes}m {secs}s")
}
