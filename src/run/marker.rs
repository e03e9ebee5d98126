// Tue Oct 13 2026 - Alex

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Final state of a managed run, published as a zero-byte marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    Failure,
    Aborted,
}

impl RunOutcome {
    pub const ALL: [RunOutcome; 3] = [RunOutcome::Success, RunOutcome::Failure, RunOutcome::Aborted];

    pub fn suffix(&self) -> &'static str {
        match self {
            RunOutcome::Success => "SUCCESS",
            RunOutcome::Failure => "FAILURE",
            RunOutcome::Aborted => "ABORTED",
        }
    }

    pub fn marker_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.suffix())
    }

    pub fn is_success(&self) -> bool {
        *self == RunOutcome::Success
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

pub fn marker_path(dir: &Path, prefix: &str, outcome: RunOutcome) -> PathBuf {
    dir.join(outcome.marker_name(prefix))
}

pub fn touch(path: &Path) -> io::Result<()> {
    File::create(path).map(|_| ())
}

pub fn write_marker(dir: &Path, prefix: &str, outcome: RunOutcome) -> io::Result<PathBuf> {
    let path = marker_path(dir, prefix, outcome);
    touch(&path)?;
    log::info!("wrote marker {}", path.display());
    Ok(path)
}

/// Removes markers left by a previous run. Returns how many were removed.
pub fn clear_markers(dir: &Path, prefix: &str) -> io::Result<usize> {
    let mut removed = 0;
    for outcome in RunOutcome::ALL {
        match fs::remove_file(marker_path(dir, prefix, outcome)) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    if removed > 0 {
        log::debug!("removed {} stale marker(s) from {}", removed, dir.display());
    }
    Ok(removed)
}

pub fn present_markers(dir: &Path, prefix: &str) -> Vec<RunOutcome> {
    RunOutcome::ALL
        .into_iter()
        .filter(|outcome| marker_path(dir, prefix, *outcome).is_file())
        .collect()
}

/// The outcome an external poller would read, if exactly one marker exists.
pub fn read_marker(dir: &Path, prefix: &str) -> Option<RunOutcome> {
    match present_markers(dir, prefix).as_slice() {
        [outcome] => Some(*outcome),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_names() {
        assert_eq!(RunOutcome::Success.marker_name("RELION_JOB_EXIT_"), "RELION_JOB_EXIT_SUCCESS");
        assert_eq!(RunOutcome::Aborted.marker_name(""), "ABORTED");
    }

    #[test]
    fn test_write_read_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_marker(dir.path(), ""), None);

        let path = write_marker(dir.path(), "", RunOutcome::Failure).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(read_marker(dir.path(), ""), Some(RunOutcome::Failure));

        write_marker(dir.path(), "", RunOutcome::Success).unwrap();
        assert_eq!(read_marker(dir.path(), ""), None);
        assert_eq!(present_markers(dir.path(), "").len(), 2);

        assert_eq!(clear_markers(dir.path(), "").unwrap(), 2);
        assert!(present_markers(dir.path(), "").is_empty());
        assert_eq!(clear_markers(dir.path(), "").unwrap(), 0);
    }
}
