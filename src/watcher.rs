//! Per-case watch controller: the hang-detection state machine.
//!
//! One `CaseWatcher` owns one case and runs forever. Each cycle waits for the
//! case's job to start, establishes a baseline snapshot of the coupler log,
//! then polls for progress. A poll interval with no change in the last line
//! is the hang signal: the job is canceled (and optionally resubmitted)
//! unless the success banner has appeared, in which case the run is treated
//! as complete. The log file disappearing mid-watch also means completion,
//! since finished runs get their logs archived.

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::{CaseConfig, Intervals};
use crate::hpc::{SchedulerInterface, NO_JOB};
use crate::progress::{find_coupler_log, read_progress, ProgressSnapshot};

/// Line the coupler writes while a component initializes. Expected transient
/// output; never counted as progress or as a stall.
pub const COMPONENT_INIT_MARKER: &str = "(component_init_cc:mct) : Initialize component";

/// Trailing characters trimmed from a newline-stripped last line before
/// comparing against [`COMPONENT_INIT_MARKER`]. The marker line carries a
/// three-character component tag after the fixed text.
pub const COMPONENT_INIT_TRIM: usize = 3;

/// States of the per-case watch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    WaitingForJob,
    EstablishingBaseline,
    Monitoring,
    Hung,
    Succeeded,
}

/// Terminal outcome of one watch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The job stalled without the success banner and was canceled.
    Hung { job_id: i64 },
    /// The run reached the success banner, or its log was archived.
    Succeeded,
    /// No coupler log appeared for the running job; see [`CaseWatcher::run`].
    LogMissing { job_id: i64 },
    /// Shutdown was requested while the cycle was in flight.
    Interrupted,
}

/// Classification of one monitoring poll against the stored baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// The log file disappeared since the previous read.
    LogVanished,
    /// Component-initialization boilerplate; not progress, not a stall.
    Boilerplate,
    /// The last line changed; carries the new baseline.
    Progress(ProgressSnapshot),
    /// The last line is byte-identical to the baseline.
    Stalled { success: bool },
    /// The log could not be read this poll; skip classification.
    Unreadable,
}

/// True when `line`, trimmed of its fixed-length suffix, equals the
/// component-initialization marker.
pub fn is_component_init(line: &str) -> bool {
    if line.len() < COMPONENT_INIT_TRIM {
        return false;
    }
    let cut = line.len() - COMPONENT_INIT_TRIM;
    line.is_char_boundary(cut) && line[..cut] == *COMPONENT_INIT_MARKER
}

/// Classify one monitoring poll.
///
/// The no-progress comparison is byte-exact: any whitespace difference in the
/// last line counts as progress. Success is cumulative across reads — the
/// banner may scroll out of the last line but stays set once seen.
pub fn poll_verdict(log_path: &Path, baseline: &ProgressSnapshot) -> PollVerdict {
    let snapshot = match read_progress(log_path) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let not_found = e
                .downcast_ref::<std::io::Error>()
                .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound);
            if not_found {
                return PollVerdict::LogVanished;
            }
            warn!("Failed to read {}: {:#}", log_path.display(), e);
            return PollVerdict::Unreadable;
        }
    };

    if is_component_init(&snapshot.last_line) {
        return PollVerdict::Boilerplate;
    }
    if snapshot.last_line == baseline.last_line {
        PollVerdict::Stalled {
            success: snapshot.success || baseline.success,
        }
    } else {
        PollVerdict::Progress(snapshot)
    }
}

/// Cancellable sleep shared by all watchers.
///
/// Sleeping is the only suspension point in a watcher; routing it through the
/// shared shutdown flag lets the supervisor stop every loop promptly.
#[derive(Clone)]
pub struct Ticker {
    shutdown: Arc<AtomicBool>,
}

impl Ticker {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self { shutdown }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in one-second slices, checking the shutdown flag
    /// between slices. Returns true iff the full duration elapsed.
    pub fn wait(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_shutdown() {
                return false;
            }
            let slice = remaining.min(Duration::from_secs(1));
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        !self.is_shutdown()
    }
}

/// Watch controller for one case.
pub struct CaseWatcher {
    case: CaseConfig,
    scheduler: Arc<dyn SchedulerInterface>,
    intervals: Intervals,
    ticker: Ticker,
    state: WatchState,
}

impl CaseWatcher {
    pub fn new(
        case: CaseConfig,
        scheduler: Arc<dyn SchedulerInterface>,
        intervals: Intervals,
        ticker: Ticker,
    ) -> Self {
        Self {
            case,
            scheduler,
            intervals,
            ticker,
            state: WatchState::WaitingForJob,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Block until the case has a running job. Returns the job id, or None if
    /// shutdown was requested. Jobs can sit queued indefinitely, so polls are
    /// spaced by the coarse queue interval.
    fn wait_for_job(&mut self) -> Option<i64> {
        self.state = WatchState::WaitingForJob;
        loop {
            let (running, job_id) = self.scheduler.find_job_for_case(&self.case.name);
            info!("{} is running: {} ({})", self.case.name, running, job_id);
            if running && job_id != NO_JOB {
                return Some(job_id);
            }
            if !self.ticker.wait(self.intervals.queue_poll) {
                return None;
            }
        }
    }

    /// One full watch cycle: wait for the job, establish a baseline, monitor
    /// to a terminal state, and take the corrective action.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let job_id = match self.wait_for_job() {
            Some(job_id) => job_id,
            None => return CycleOutcome::Interrupted,
        };

        self.state = WatchState::EstablishingBaseline;
        info!(
            "{}: job {} is running, establishing baseline",
            self.case.name, job_id
        );
        // Give the job a moment to produce its first output.
        if !self.ticker.wait(self.intervals.startup_delay) {
            return CycleOutcome::Interrupted;
        }

        let log_path = match find_coupler_log(&self.case.run_dir, &self.case.name, job_id) {
            Some(path) => path,
            None => {
                error!(
                    "{}: no coupler log matching cpl.log.{}.* under {}; \
                     check the configured run directory",
                    self.case.name,
                    job_id,
                    self.case
                        .run_dir
                        .join(&self.case.name)
                        .join("run")
                        .display()
                );
                return CycleOutcome::LogMissing { job_id };
            }
        };
        info!(
            "{}: reading coupler log {}",
            self.case.name,
            log_path.display()
        );

        let mut baseline = match read_progress(&log_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    "{}: failed to establish baseline from {}: {:#}",
                    self.case.name,
                    log_path.display(),
                    e
                );
                return CycleOutcome::LogMissing { job_id };
            }
        };
        debug!("{}: baseline: {}", self.case.name, baseline.last_line);

        self.monitor(job_id, &log_path, &mut baseline)
    }

    /// The monitoring loop. Terminal states never fall back to
    /// re-establishing the baseline; the baseline only moves forward on
    /// observed progress.
    fn monitor(
        &mut self,
        job_id: i64,
        log_path: &Path,
        baseline: &mut ProgressSnapshot,
    ) -> CycleOutcome {
        self.state = WatchState::Monitoring;
        loop {
            if !self.ticker.wait(self.intervals.poll_interval) {
                return CycleOutcome::Interrupted;
            }
            match poll_verdict(log_path, baseline) {
                PollVerdict::LogVanished => {
                    self.state = WatchState::Succeeded;
                    info!(
                        "{}: coupler log archived; treating the run as complete",
                        self.case.name
                    );
                    return CycleOutcome::Succeeded;
                }
                PollVerdict::Boilerplate => {
                    debug!("{}: component initialization in progress", self.case.name);
                }
                PollVerdict::Unreadable => {}
                PollVerdict::Progress(snapshot) => {
                    debug!("{}: progress: {}", self.case.name, snapshot.last_line);
                    *baseline = snapshot;
                }
                PollVerdict::Stalled { success: true } => {
                    self.state = WatchState::Succeeded;
                    info!("{}: job {} finished successfully", self.case.name, job_id);
                    return CycleOutcome::Succeeded;
                }
                PollVerdict::Stalled { success: false } => {
                    self.state = WatchState::Hung;
                    warn!(
                        "{}: no progress over the last poll interval; canceling job {}",
                        self.case.name, job_id
                    );
                    self.scheduler.cancel(job_id);
                    if self.case.resubmit {
                        self.resubmit();
                    }
                    return CycleOutcome::Hung { job_id };
                }
            }
        }
    }

    /// Invoke the case's submission entry point. The script's contract is
    /// opaque; the exit status is logged and failures never propagate.
    fn resubmit(&self) {
        let script = self.submit_script();
        info!("{}: resubmitting via {}", self.case.name, script.display());
        match Command::new(&script).output() {
            Ok(output) if output.status.success() => {
                info!("{}: resubmission accepted", self.case.name);
            }
            Ok(output) => {
                error!(
                    "{}: case.submit exited with {}: {}",
                    self.case.name,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                error!(
                    "{}: failed to run {}: {}",
                    self.case.name,
                    script.display(),
                    e
                );
            }
        }
    }

    fn submit_script(&self) -> PathBuf {
        self.case
            .case_dir
            .join(&self.case.name)
            .join("case.submit")
    }

    /// Run cycles until shutdown. Hung and succeeded cycles loop straight
    /// back to waiting for the next submission; a cycle that found no coupler
    /// log backs off one queue interval first so a misconfigured case stays
    /// loudly visible without spinning.
    pub fn run(&mut self) {
        while !self.ticker.is_shutdown() {
            match self.run_cycle() {
                CycleOutcome::Interrupted => break,
                CycleOutcome::Hung { job_id } => {
                    info!(
                        "{}: cycle ended hung (job {}); watching for the next submission",
                        self.case.name, job_id
                    );
                }
                CycleOutcome::Succeeded => {
                    info!(
                        "{}: cycle ended successfully; watching for the next submission",
                        self.case.name
                    );
                }
                CycleOutcome::LogMissing { .. } => {
                    if !self.ticker.wait(self.intervals.queue_poll) {
                        break;
                    }
                }
            }
        }
        info!("{}: watcher stopped", self.case.name);
    }
}
