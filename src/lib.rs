//! runwatch - hang detection and automatic resubmission for Slurm-managed
//! simulation runs.
//!
//! Long climate-model runs occasionally stall without crashing: the job keeps
//! its allocation but the coupler log stops advancing. runwatch monitors one
//! or more cases, detects the stall from the scheduler state plus the growing
//! log file, cancels the hung job, and optionally resubmits the case.

pub mod config;
pub mod hpc;
pub mod progress;
pub mod supervisor;
pub mod watcher;
