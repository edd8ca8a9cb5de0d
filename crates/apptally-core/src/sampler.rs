use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::day::DayKey;
use crate::tracker::Shared;
use crate::window_source::{self, WindowSource};
use crate::{epoch_seconds_now, lock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// How often the loop wakes to check for a stop request.
    pub poll_interval: Duration,
    /// Minimum spacing between two ticks; each tick counts one second.
    pub tick_interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub day: DayKey,
    /// Processes with at least one usable window.
    pub processes: usize,
    /// Processes newly added to the tracked set.
    pub registered: usize,
    /// Processes whose counter advanced.
    pub counted: usize,
    /// Whether the usage history reached disk. When false the increments
    /// stay in memory and go out with the next successful save.
    pub saved: bool,
}

/// One sampling step: snapshot, publish, auto-register, count, persist.
pub(crate) fn run_tick(
    shared: &Shared,
    source: &mut dyn WindowSource,
    day: DayKey,
    now: f64,
) -> TickReport {
    let removed = shared.store.removed_names();
    let snapshot = window_source::snapshot(source, |name| removed.contains(name));
    let names: Vec<String> = snapshot.keys().cloned().collect();
    shared.set_live(snapshot);

    let registered = shared
        .store
        .auto_register_all(names.iter().map(String::as_str));

    let mut counted = 0;
    for name in &names {
        if shared.store.is_tracked(name) {
            shared.ledger.tick(day, name, now);
            counted += 1;
        }
    }

    let saved = match shared.ledger.save() {
        Ok(()) => true,
        Err(err) => {
            log::error!("usage history save failed, keeping it in memory: {err:#}");
            false
        }
    };

    TickReport {
        day,
        processes: names.len(),
        registered,
        counted,
        saved,
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the background sampling thread. Each started thread gets its own
/// stop flag, so a stopped thread can never keep ticking alongside a newer
/// one.
pub(crate) struct Sampler {
    config: SamplerConfig,
    source: Arc<Mutex<Box<dyn WindowSource>>>,
    worker: Mutex<Option<Worker>>,
}

impl Sampler {
    pub(crate) fn new(source: Box<dyn WindowSource>, config: SamplerConfig) -> Self {
        Self {
            config,
            source: Arc::new(Mutex::new(source)),
            worker: Mutex::new(None),
        }
    }

    /// Returns `false` when the loop was already running.
    pub(crate) fn start(&self, shared: Arc<Shared>) -> Result<bool> {
        let mut worker = lock(&self.worker);
        if is_running(&worker) {
            return Ok(false);
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let source = Arc::clone(&self.source);
        let config = self.config;
        let handle = thread::Builder::new()
            .name("apptally-sampler".to_owned())
            .spawn(move || run_loop(shared, source, thread_running, config))
            .context("failed to spawn sampler thread")?;

        *worker = Some(Worker { running, handle });
        Ok(true)
    }

    /// Returns `false` when the loop was not running. Blocks until the
    /// thread has finished its current tick, unless called from that thread.
    pub(crate) fn stop(&self) -> bool {
        let Some(worker) = lock(&self.worker).take() else {
            return false;
        };
        let was_running = worker.running.swap(false, Ordering::SeqCst);

        if worker.handle.thread().id() != thread::current().id()
            && worker.handle.join().is_err()
        {
            log::error!("sampler thread panicked");
        }
        was_running
    }

    pub(crate) fn is_running(&self) -> bool {
        is_running(&lock(&self.worker))
    }

    /// Runs `work` with the loop stopped and keeps it stopped until `work`
    /// returns; a concurrent `start` waits.
    pub(crate) fn while_stopped<T>(&self, work: impl FnOnce() -> T) -> Result<T> {
        let worker = lock(&self.worker);
        if is_running(&worker) {
            bail!("sampling loop is running");
        }
        let result = work();
        drop(worker);
        Ok(result)
    }

    pub(crate) fn sample_now(&self, shared: &Shared) -> Result<TickReport> {
        self.while_stopped(|| {
            let mut source = lock(&self.source);
            run_tick(shared, &mut **source, DayKey::today(), epoch_seconds_now())
        })
    }
}

fn is_running(worker: &Option<Worker>) -> bool {
    worker
        .as_ref()
        .map(|w| w.running.load(Ordering::SeqCst))
        .unwrap_or(false)
}

fn run_loop(
    shared: Arc<Shared>,
    source: Arc<Mutex<Box<dyn WindowSource>>>,
    running: Arc<AtomicBool>,
    config: SamplerConfig,
) {
    log::info!(
        "sampling started | tick={}ms | poll={}ms",
        config.tick_interval.as_millis(),
        config.poll_interval.as_millis()
    );

    let mut last_tick = Instant::now();
    while running.load(Ordering::SeqCst) {
        if last_tick.elapsed() >= config.tick_interval {
            last_tick = Instant::now();
            let report = {
                let mut source = lock(&source);
                run_tick(&shared, &mut **source, DayKey::today(), epoch_seconds_now())
            };
            log::debug!(
                "tick {} | processes={} registered={} counted={} saved={}",
                report.day,
                report.processes,
                report.registered,
                report.counted,
                report.saved
            );
            shared.notify_refresh();
        }
        thread::sleep(config.poll_interval);
    }

    log::info!("sampling stopped");
}
