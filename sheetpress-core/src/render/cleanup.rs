//! Removal of intermediate files handed out to callers

use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Already gone when cleanup ran
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete `paths` after waiting `grace`. Failures are logged and reported, never raised.
pub fn cleanup_temp_files<I, P>(paths: I, grace: Duration) -> CleanupReport
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    if !grace.is_zero() {
        thread::sleep(grace);
    }

    let mut report = CleanupReport::default();
    for path in paths {
        let path = path.into();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed temporary file {}", path.display());
                report.removed.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => report.missing.push(path),
            Err(e) => {
                warn!("could not remove {}: {e}", path.display());
                report.failed.push((path, e.to_string()));
            }
        }
    }
    report
}
