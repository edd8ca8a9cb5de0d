use anyhow::{bail, Context, Result};
use apptally_core::tracker::{CONFIG_FILE_NAME, USAGE_FILE_NAME};
use apptally_core::{SamplerConfig, TrackerPaths};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
    pub config_path: PathBuf,
    pub usage_path: PathBuf,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub start_paused: bool,
}

impl Config {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config_path = PathBuf::from(CONFIG_FILE_NAME);
        let mut usage_path = PathBuf::from(USAGE_FILE_NAME);
        let mut poll_ms: u64 = 100;
        let mut tick_ms: u64 = 1000;
        let mut start_paused = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args.next().context("missing value for --config")?;
                    config_path = PathBuf::from(value);
                }
                "--data" => {
                    let value = args.next().context("missing value for --data")?;
                    usage_path = PathBuf::from(value);
                }
                "--poll-ms" => {
                    let value = args.next().context("missing value for --poll-ms")?;
                    poll_ms = value
                        .parse::<u64>()
                        .with_context(|| format!("invalid --poll-ms value: {value}"))?;
                }
                "--tick-ms" => {
                    let value = args.next().context("missing value for --tick-ms")?;
                    tick_ms = value
                        .parse::<u64>()
                        .with_context(|| format!("invalid --tick-ms value: {value}"))?;
                }
                "--paused" => start_paused = true,
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => bail!("unknown argument: {arg}"),
            }
        }

        if poll_ms == 0 {
            bail!("--poll-ms must be greater than zero");
        }
        if tick_ms < 1000 {
            bail!("--tick-ms must be at least 1000 (each tick counts one second)");
        }
        if poll_ms > tick_ms {
            bail!("--poll-ms must not exceed --tick-ms");
        }

        Ok(Self {
            config_path,
            usage_path,
            poll_interval: Duration::from_millis(poll_ms),
            tick_interval: Duration::from_millis(tick_ms),
            start_paused,
        })
    }

    pub fn paths(&self) -> TrackerPaths {
        TrackerPaths {
            config: self.config_path.clone(),
            usage: self.usage_path.clone(),
        }
    }

    pub fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            poll_interval: self.poll_interval,
            tick_interval: self.tick_interval,
        }
    }
}

fn print_help() {
    println!(
        "\
AppTally

Usage:
  apptally [--config <path>] [--data <path>] [--poll-ms <ms>] [--tick-ms <ms>] [--paused]

Options:
  --config   Application settings file (default: app_config.json)
  --data     Usage history file (default: app_usage_data.json)
  --poll-ms  Stop-check interval of the sampling loop in milliseconds (default: 100)
  --tick-ms  Sampling interval in milliseconds, at least 1000 (default: 1000)
  --paused   Do not start tracking at launch
  -h, --help Print this help

Type `help` once running for the console commands."
    );
}
