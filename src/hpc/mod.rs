//! Scheduler (HPC workload manager) interfaces.
//!
//! The watch loop only needs three things from the scheduler: a per-job
//! status query, the list of currently visible job ids, and cancellation.
//! The trait keeps the state machine independent of the scheduler's output
//! format; `SlurmInterface` is the concrete implementation.

pub mod common;
pub mod slurm;

pub use common::{JobInfo, NO_JOB, UNKNOWN_CASE};
pub use slurm::SlurmInterface;

/// Operations the watch loop needs from a workload manager.
///
/// Queries never fail: transient scheduler problems map to "not running" /
/// empty listing so one flaky query cannot abort a watch cycle.
pub trait SchedulerInterface: Send + Sync {
    /// Query one job's case name and running state.
    fn job_status(&self, job_id: i64) -> JobInfo;

    /// Job ids currently visible in the global queue listing.
    fn list_job_ids(&self) -> Vec<i64>;

    /// Cancel a job. Fire-and-forget; the exit status is logged, not
    /// returned, and the cancel's effect is not confirmed.
    fn cancel(&self, job_id: i64);

    /// Find the job currently submitted for a case.
    ///
    /// Queries every job in the queue listing and returns the first whose
    /// case name matches, as `(running, job_id)`. `(false, NO_JOB)` when no
    /// job matches, for all queue sizes including zero.
    fn find_job_for_case(&self, case_name: &str) -> (bool, i64) {
        for job_id in self.list_job_ids() {
            let info = self.job_status(job_id);
            if info.case_name == case_name {
                return (info.running, job_id);
            }
        }
        (false, NO_JOB)
    }
}
