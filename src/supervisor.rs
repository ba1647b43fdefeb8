//! Supervisor: one watcher thread per case.
//!
//! Watchers are fully isolated; they share only the scheduler handle and the
//! shutdown flag. A watcher that exits while shutdown has not been requested
//! is restarted, so one case's fault never takes down the others. The
//! process is expected to run unattended for weeks.

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{CaseConfig, Intervals};
use crate::hpc::SchedulerInterface;
use crate::watcher::{CaseWatcher, Ticker};

/// Interval between checks for dead watcher threads.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Supervisor {
    scheduler: Arc<dyn SchedulerInterface>,
    intervals: Intervals,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(scheduler: Arc<dyn SchedulerInterface>, intervals: Intervals) -> Self {
        Self {
            scheduler,
            intervals,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with signal handlers; setting it stops all watchers.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn spawn_watcher(&self, case: CaseConfig) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let intervals = self.intervals;
        let ticker = Ticker::new(self.shutdown.clone());
        let name = format!("watch-{}", case.name);
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut watcher = CaseWatcher::new(case, scheduler, intervals, ticker);
                watcher.run();
            })
            .expect("Failed to spawn watcher thread")
    }

    /// Run watchers for all cases until shutdown, restarting any that exit
    /// early, then join them all.
    pub fn run(&self, cases: Vec<CaseConfig>) {
        let mut workers: Vec<(CaseConfig, JoinHandle<()>)> = cases
            .into_iter()
            .map(|case| {
                info!("Starting watcher for {}", case.name);
                let handle = self.spawn_watcher(case.clone());
                (case, handle)
            })
            .collect();

        while !self.shutdown.load(Ordering::SeqCst) {
            thread::sleep(REAP_INTERVAL);
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            for (case, handle) in workers.iter_mut() {
                if !handle.is_finished() {
                    continue;
                }
                let finished = std::mem::replace(handle, self.spawn_watcher(case.clone()));
                match finished.join() {
                    Ok(()) => warn!("Watcher for {} exited unexpectedly; restarted", case.name),
                    Err(_) => error!("Watcher for {} panicked; restarted", case.name),
                }
            }
        }

        info!("Shutdown requested; stopping watchers");
        for (case, handle) in workers {
            if handle.join().is_err() {
                error!("Watcher for {} panicked during shutdown", case.name);
            }
        }
    }
}
