//! Progress oracle: reads a case's coupler log and extracts a progress
//! fingerprint.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Banner the coupler writes on successful completion. Exact match only.
pub const SUCCESS_MARKER: &str =
    "(seq_mct_drv): ===============          SUCCESSFUL TERMINATION OF CPL7-cesm ===============";

/// Fingerprint of a job's progress at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Last non-empty line of the log, trailing newline stripped.
    pub last_line: String,
    /// True iff the success banner has appeared anywhere in the file.
    pub success: bool,
}

/// Re-read the whole log and compute a fresh snapshot.
///
/// The file is re-read from the start on every call; there is no persisted
/// offset. Log sizes in this domain make that cheap, and it keeps restarts
/// stateless. Opening a missing file propagates the `NotFound` error; callers
/// that need to distinguish "not yet created" from "rotated away" check
/// existence first.
pub fn read_progress(path: &Path) -> Result<ProgressSnapshot> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut last_line = String::new();
    let mut success = false;
    for line in reader.lines() {
        let line =
            line.with_context(|| format!("Failed to read log file {}", path.display()))?;
        if line == SUCCESS_MARKER {
            success = true;
        }
        if !line.is_empty() {
            last_line = line;
        }
    }

    Ok(ProgressSnapshot { last_line, success })
}

/// Locate the coupler log for a job: the most recently modified file matching
/// `{run_dir}/{case_name}/run/cpl.log.{job_id}.*`.
///
/// Returns None when the run directory or a matching file does not exist.
pub fn find_coupler_log(run_dir: &Path, case_name: &str, job_id: i64) -> Option<PathBuf> {
    let dir = run_dir.join(case_name).join("run");
    let prefix = format!("cpl.log.{}.", job_id);

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(&dir).ok()?.flatten() {
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let is_newer = match &newest {
            Some((newest_time, _)) => modified >= *newest_time,
            None => true,
        };
        if is_newer {
            newest = Some((modified, entry.path()));
        }
    }

    newest.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_progress_last_line() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "cpl.log", "line one\nline two\nline three\n");
        let snapshot = read_progress(&path).unwrap();
        assert_eq!(snapshot.last_line, "line three");
        assert!(!snapshot.success);
    }

    #[test]
    fn test_read_progress_skips_trailing_empty_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "cpl.log", "line one\nline two\n\n\n");
        let snapshot = read_progress(&path).unwrap();
        assert_eq!(snapshot.last_line, "line two");
    }

    #[test]
    fn test_read_progress_success_marker_mid_file() {
        let dir = TempDir::new().unwrap();
        let contents = format!("step 100\n{}\nshutting down\n", SUCCESS_MARKER);
        let path = write_log(&dir, "cpl.log", &contents);
        let snapshot = read_progress(&path).unwrap();
        assert!(snapshot.success);
        assert_eq!(snapshot.last_line, "shutting down");
    }

    #[test]
    fn test_read_progress_no_fuzzy_marker_match() {
        let dir = TempDir::new().unwrap();
        let contents = format!("{} extra\n", SUCCESS_MARKER);
        let path = write_log(&dir, "cpl.log", &contents);
        let snapshot = read_progress(&path).unwrap();
        assert!(!snapshot.success);
    }

    #[test]
    fn test_read_progress_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "cpl.log", "a\nb\nc\n");
        let first = read_progress(&path).unwrap();
        let second = read_progress(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_progress_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = read_progress(&dir.path().join("missing.log")).unwrap_err();
        let io_err = err
            .downcast_ref::<std::io::Error>()
            .expect("expected an io::Error");
        assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_find_coupler_log_matches_job_id() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("mycase").join("run");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join("cpl.log.4189307.260812-091433"), "x").unwrap();
        fs::write(run.join("cpl.log.4100000.260701-120000"), "x").unwrap();
        fs::write(run.join("atm.log.4189307.260812-091433"), "x").unwrap();

        let found = find_coupler_log(dir.path(), "mycase", 4189307).unwrap();
        assert_eq!(
            found.file_name().unwrap().to_str().unwrap(),
            "cpl.log.4189307.260812-091433"
        );
    }

    #[test]
    fn test_find_coupler_log_no_match() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("mycase").join("run");
        fs::create_dir_all(&run).unwrap();
        assert!(find_coupler_log(dir.path(), "mycase", 4189307).is_none());
    }

    #[test]
    fn test_find_coupler_log_missing_run_dir() {
        let dir = TempDir::new().unwrap();
        assert!(find_coupler_log(dir.path(), "mycase", 4189307).is_none());
    }
}
