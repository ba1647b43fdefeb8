//! Configuration for the watch process.
//!
//! A single TOML file supplies the case list and the poll intervals. There is
//! no persisted state beyond this file: on restart every watcher re-derives
//! its situation from the live scheduler and log state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for runwatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Seconds between queue polls while waiting for a case's job to start.
    /// Jobs can sit in the queue for days; keep this coarse.
    pub queue_poll_secs: f64,

    /// Seconds to wait after a job starts before reading its log, so the job
    /// has a chance to produce initial output.
    pub startup_delay_secs: f64,

    /// Seconds between progress polls while monitoring a running job.
    pub poll_interval_secs: f64,

    /// Cases to watch.
    pub cases: Vec<CaseConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            queue_poll_secs: 600.0,
            startup_delay_secs: 60.0,
            poll_interval_secs: 300.0,
            cases: Vec::new(),
        }
    }
}

/// One simulation case to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    /// Case name, as carried in the scheduler job name (without the `run.`
    /// prefix the run scripts attach).
    pub name: String,

    /// Directory holding `{name}/run/cpl.log.*` for this case.
    pub run_dir: PathBuf,

    /// Directory holding `{name}/case.submit`.
    pub case_dir: PathBuf,

    /// Resubmit the case after canceling a hung job.
    #[serde(default = "default_resubmit")]
    pub resubmit: bool,
}

fn default_resubmit() -> bool {
    true
}

/// Poll intervals resolved to durations.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub queue_poll: Duration,
    pub startup_delay: Duration,
    pub poll_interval: Duration,
}

impl WatchConfig {
    /// Load the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: WatchConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn intervals(&self) -> Intervals {
        Intervals {
            queue_poll: Duration::from_secs_f64(self.queue_poll_secs),
            startup_delay: Duration::from_secs_f64(self.startup_delay_secs),
            poll_interval: Duration::from_secs_f64(self.poll_interval_secs),
        }
    }
}
