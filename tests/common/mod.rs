//! Shared test doubles.
#![allow(dead_code)]

use runwatch::hpc::{JobInfo, SchedulerInterface};
use std::sync::Mutex;

/// In-memory scheduler: a fixed queue listing plus a record of cancels.
pub struct FakeScheduler {
    jobs: Mutex<Vec<(i64, JobInfo)>>,
    canceled: Mutex<Vec<i64>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            canceled: Mutex::new(Vec::new()),
        }
    }

    pub fn set_job(&self, job_id: i64, case_name: &str, running: bool) {
        self.jobs.lock().unwrap().push((
            job_id,
            JobInfo {
                case_name: case_name.to_string(),
                running,
            },
        ));
    }

    pub fn canceled(&self) -> Vec<i64> {
        self.canceled.lock().unwrap().clone()
    }
}

impl SchedulerInterface for FakeScheduler {
    fn job_status(&self, job_id: i64) -> JobInfo {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == job_id)
            .map(|(_, info)| info.clone())
            .unwrap_or_else(JobInfo::unknown)
    }

    fn list_job_ids(&self) -> Vec<i64> {
        self.jobs.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    fn cancel(&self, job_id: i64) {
        self.canceled.lock().unwrap().push(job_id);
    }
}
