mod config;
mod console;
#[cfg(windows)]
mod instance;

use anyhow::Result;
use apptally_core::platform::NativeWindowSource;
use apptally_core::{LoadStatus, Tracker};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::console::{describe_load, parse_command, Console, Flow};

const EVENT_WAIT: Duration = Duration::from_millis(100);

enum Event {
    Line(String),
    InputClosed,
    Refresh,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[cfg(windows)]
    let _instance_guard = match instance::acquire_single_instance_guard() {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            log::warn!("another AppTally instance is already running");
            return Ok(());
        }
        Err(err) => {
            log::error!("single-instance guard error: {err:#}");
            return Ok(());
        }
    };

    let config = Config::from_args()?;
    let (tracker, report) = Tracker::open(
        &config.paths(),
        Box::new(NativeWindowSource::new()),
        config.sampler(),
    );
    report_load("configuration", &config.config_path, &report.config);
    report_load("usage history", &config.usage_path, &report.usage);

    let (events_tx, events_rx) = mpsc::channel::<Event>();
    let watching = Arc::new(AtomicBool::new(false));
    {
        let events_tx = events_tx.clone();
        let watching = Arc::clone(&watching);
        tracker.set_refresh(move || {
            if watching.load(Ordering::Relaxed) {
                let _ = events_tx.send(Event::Refresh);
            }
        });
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    }) {
        log::warn!("ctrlc handler registration warning: {err}");
    }

    spawn_input_pump(events_tx);

    log::info!(
        "AppTally started | config={} | data={} | poll={}ms | tick={}ms",
        config.config_path.display(),
        config.usage_path.display(),
        config.poll_interval.as_millis(),
        config.tick_interval.as_millis()
    );

    if !config.start_paused {
        if let Err(err) = tracker.start() {
            log::error!("could not start tracking: {err:#}");
        }
    }

    let mut console = Console::new(&tracker, Arc::clone(&watching));
    while !shutdown.load(Ordering::Relaxed) {
        match events_rx.recv_timeout(EVENT_WAIT) {
            Ok(Event::Line(line)) => {
                let mut out = io::stdout().lock();
                let outcome = parse_command(&line).and_then(|command| match command {
                    Some(command) => console.execute(command, &mut out),
                    None => Ok(Flow::Continue),
                });
                match outcome {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(err) => {
                        let _ = writeln!(out, "error: {err:#}");
                    }
                }
                let _ = out.flush();
            }
            Ok(Event::Refresh) => {
                let mut out = io::stdout().lock();
                if let Err(err) = console.render(&mut out) {
                    log::warn!("render failed: {err:#}");
                }
                let _ = out.flush();
            }
            Ok(Event::InputClosed) => {
                log::info!("console input closed; tracking continues until Ctrl-C");
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
    }

    tracker.shutdown()?;
    log::info!("AppTally stopped");
    Ok(())
}

fn report_load(what: &str, path: &Path, status: &LoadStatus) {
    match status {
        LoadStatus::Corrupt(_) => {
            log::warn!("{what} {}: {}", path.display(), describe_load(status));
        }
        _ => log::info!("{what} {}: {}", path.display(), describe_load(status)),
    }
}

fn spawn_input_pump(events: Sender<Event>) {
    let spawned = thread::Builder::new()
        .name("apptally-input".to_owned())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if events.send(Event::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("console input error: {err}");
                        break;
                    }
                }
            }
            let _ = events.send(Event::InputClosed);
        });
    if let Err(err) = spawned {
        log::warn!("console input unavailable: {err}");
    }
}
