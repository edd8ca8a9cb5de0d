//! Tracking engine for AppTally: samples the desktop's visible windows about
//! once per second, attributes the elapsed time to tracked applications, and
//! keeps a day-bucketed usage history next to the classification settings.

pub mod classification;
pub mod day;
pub mod ledger;
pub mod persist;
pub mod platform;
pub mod projection;
pub mod sampler;
pub mod tracker;
pub mod window_source;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub use classification::{Classification, ClassificationStore};
pub use day::DayKey;
pub use ledger::{format_duration, UsageLedger, UsageRecord};
pub use persist::LoadStatus;
pub use projection::{project, ProjectedRow};
pub use sampler::{SamplerConfig, TickReport};
pub use tracker::{LoadReport, Tracker, TrackerPaths};
pub use window_source::{RawWindow, StaticWindowSource, WindowSnapshot, WindowSource};

/// Locks a store, recovering the data if another thread panicked while
/// holding the lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn epoch_seconds_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
