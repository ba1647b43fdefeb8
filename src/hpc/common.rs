//! Common scheduler types.

/// Sentinel job id returned when no job matches a case.
pub const NO_JOB: i64 = -1;

/// Case name reported when a job's status output cannot be parsed.
pub const UNKNOWN_CASE: &str = "unknown";

/// Result of a per-job status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Case name the job belongs to, or [`UNKNOWN_CASE`].
    pub case_name: String,
    /// True iff the scheduler reports a populated start time for the job.
    pub running: bool,
}

impl JobInfo {
    /// Sentinel for malformed or missing status output.
    pub fn unknown() -> Self {
        Self {
            case_name: UNKNOWN_CASE.to_string(),
            running: false,
        }
    }
}
