//! Slurm scheduler interface implementation.
//!
//! Status and queue information come from external commands with
//! fixed-offset text output. The offsets are an external contract with the
//! site tooling; they are isolated in [`parse_job_status`] and
//! [`parse_queue_job_ids`] so format drift is caught by the unit tests below
//! instead of surfacing as misbehavior in the watch loop.

use log::{error, info, trace, warn};
use std::env;
use std::ops::Range;
use std::process::Command;

use super::common::JobInfo;
use super::SchedulerInterface;

/// Column at which field values start in `job-statistics` output.
const STATUS_VALUE_OFFSET: usize = 24;
/// Line index carrying the job name field.
const STATUS_NAME_LINE: usize = 2;
/// Line index carrying the start time field.
const STATUS_START_TIME_LINE: usize = 4;
/// Start time value reported for jobs that have not started.
const START_TIME_UNKNOWN: &str = "Unknown";
/// Columns carrying the job id in each `squeue` row.
const QUEUE_JOB_ID_COLUMNS: Range<usize> = 11..18;
/// Job names are the case name with this prefix attached by the run scripts.
const JOB_NAME_PREFIX: &str = "run.";

/// Parse the semi-structured `job-statistics -j <id>` output.
///
/// Tolerates malformed or short output: if the name or start-time field is
/// missing or unparseable the unknown sentinel is returned, never an error,
/// so one bad job cannot abort a queue scan.
pub fn parse_job_status(raw: &str) -> JobInfo {
    let lines: Vec<&str> = raw.lines().collect();
    let field = |index: usize| -> Option<&str> {
        lines
            .get(index)
            .and_then(|line| line.get(STATUS_VALUE_OFFSET..))
            .map(str::trim)
    };

    let name = match field(STATUS_NAME_LINE) {
        Some(name) if !name.is_empty() => name,
        _ => return JobInfo::unknown(),
    };
    let start_time = match field(STATUS_START_TIME_LINE) {
        Some(start_time) => start_time,
        None => return JobInfo::unknown(),
    };

    let case_name = name.strip_prefix(JOB_NAME_PREFIX).unwrap_or(name);
    JobInfo {
        case_name: case_name.to_string(),
        running: !start_time.is_empty() && start_time != START_TIME_UNKNOWN,
    }
}

/// Parse the global `squeue` listing into job ids.
///
/// The header row is skipped; any row whose id columns do not parse as an
/// integer is skipped as well.
pub fn parse_queue_job_ids(raw: &str) -> Vec<i64> {
    raw.lines()
        .skip(1)
        .filter_map(|line| line.get(QUEUE_JOB_ID_COLUMNS)?.trim().parse::<i64>().ok())
        .collect()
}

/// Slurm scheduler implementation.
pub struct SlurmInterface;

impl SlurmInterface {
    pub fn new() -> Self {
        Self
    }

    /// Get the job-statistics executable path (allows for testing with fake binary)
    fn get_job_statistics_exec() -> String {
        env::var("RUNWATCH_FAKE_JOB_STATISTICS").unwrap_or_else(|_| "job-statistics".to_string())
    }

    /// Get the squeue executable path (allows for testing with fake binary)
    fn get_squeue_exec() -> String {
        env::var("RUNWATCH_FAKE_SQUEUE").unwrap_or_else(|_| "squeue".to_string())
    }

    /// Get the scancel executable path (allows for testing with fake binary)
    fn get_scancel_exec() -> String {
        env::var("RUNWATCH_FAKE_SCANCEL").unwrap_or_else(|_| "scancel".to_string())
    }

    /// Run a command and return its stdout. A failed spawn returns None; a
    /// non-zero exit is logged but its stdout is still parsed, since the
    /// parsers tolerate short output.
    fn run_command(cmd: &str, args: &[&str]) -> Option<String> {
        trace!("Running command: {} {:?}", cmd, args);
        match Command::new(cmd).args(args).output() {
            Ok(output) => {
                if !output.status.success() {
                    warn!(
                        "{} exited with {}: {}",
                        cmd,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Some(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Err(e) => {
                warn!("Failed to run {}: {}", cmd, e);
                None
            }
        }
    }
}

impl Default for SlurmInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerInterface for SlurmInterface {
    fn job_status(&self, job_id: i64) -> JobInfo {
        let exec = Self::get_job_statistics_exec();
        match Self::run_command(&exec, &["-j", &job_id.to_string()]) {
            Some(stdout) => {
                trace!("job-statistics output for {}: [{}]", job_id, stdout);
                parse_job_status(&stdout)
            }
            None => JobInfo::unknown(),
        }
    }

    fn list_job_ids(&self) -> Vec<i64> {
        let exec = Self::get_squeue_exec();
        match Self::run_command(&exec, &[]) {
            Some(stdout) => parse_queue_job_ids(&stdout),
            None => Vec::new(),
        }
    }

    fn cancel(&self, job_id: i64) {
        let exec = Self::get_scancel_exec();
        match Command::new(&exec).arg(job_id.to_string()).output() {
            Ok(output) if output.status.success() => {
                info!("Canceled Slurm job {}", job_id);
            }
            Ok(output) => {
                error!(
                    "Failed to cancel Slurm job {}: {}",
                    job_id,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                error!("Failed to run {}: {}", exec, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpc::common::UNKNOWN_CASE;

    fn sample_status(name: &str, start_time: &str) -> String {
        format!(
            "Job statistics for 4189307\n\
             --------------------------------\n\
             {:<24}{}\n\
             {:<24}{}\n\
             {:<24}{}\n",
            "Job Name:", name, "Partition:", "thin", "Start Time:", start_time
        )
    }

    #[test]
    fn test_parse_job_status_running() {
        let raw = sample_status(
            "run.b.e21.B1850CAM5.f09_g17.26ka-spinup.001",
            "2026-08-12T09:14:33",
        );
        let info = parse_job_status(&raw);
        assert_eq!(info.case_name, "b.e21.B1850CAM5.f09_g17.26ka-spinup.001");
        assert!(info.running);
    }

    #[test]
    fn test_parse_job_status_queued() {
        let raw = sample_status("run.mycase", "Unknown");
        let info = parse_job_status(&raw);
        assert_eq!(info.case_name, "mycase");
        assert!(!info.running);
    }

    #[test]
    fn test_parse_job_status_empty_start_time() {
        let raw = sample_status("run.mycase", "");
        let info = parse_job_status(&raw);
        assert!(!info.running);
    }

    #[test]
    fn test_parse_job_status_name_without_prefix() {
        // Jobs not submitted through the run scripts keep their raw name.
        let raw = sample_status("postprocess", "2026-08-12T09:14:33");
        let info = parse_job_status(&raw);
        assert_eq!(info.case_name, "postprocess");
        assert!(info.running);
    }

    #[test]
    fn test_parse_job_status_short_output() {
        let info = parse_job_status("Job statistics for 4189307\n");
        assert_eq!(info.case_name, UNKNOWN_CASE);
        assert!(!info.running);
    }

    #[test]
    fn test_parse_job_status_garbage() {
        let info = parse_job_status("squeue: error: Invalid job id specified\n");
        assert_eq!(info.case_name, UNKNOWN_CASE);
        assert!(!info.running);
    }

    #[test]
    fn test_parse_job_status_empty() {
        let info = parse_job_status("");
        assert_eq!(info.case_name, UNKNOWN_CASE);
        assert!(!info.running);
    }

    fn queue_row(job_id: i64) -> String {
        format!("{:>18} {:>9} {:>8} {:>8}  R", job_id, "thin", "run.b.e2", "raymond")
    }

    #[test]
    fn test_parse_queue_job_ids() {
        let raw = format!(
            "             JOBID PARTITION     NAME     USER ST\n{}\n{}\n",
            queue_row(4189307),
            queue_row(4189355),
        );
        assert_eq!(parse_queue_job_ids(&raw), vec![4189307, 4189355]);
    }

    #[test]
    fn test_parse_queue_skips_malformed_rows() {
        let raw = format!(
            "             JOBID PARTITION     NAME     USER ST\n\
             short row\n\
             {}\n\
             ===== not a job ===============================\n",
            queue_row(4189307),
        );
        assert_eq!(parse_queue_job_ids(&raw), vec![4189307]);
    }

    #[test]
    fn test_parse_queue_header_only() {
        let raw = "             JOBID PARTITION     NAME     USER ST\n";
        assert!(parse_queue_job_ids(raw).is_empty());
    }

    #[test]
    fn test_parse_queue_empty() {
        assert!(parse_queue_job_ids("").is_empty());
    }
}
