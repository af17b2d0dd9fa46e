//! Age-based retention sweep.
//!
//! Deletes regular files older than a threshold from the input and output
//! directories. Running it again immediately is a no-op, and it is safe to run
//! alongside conversions as long as the threshold is far larger than the
//! invocation timeout (enforced by [`Config::validate`](crate::Config::validate)).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A file the sweep could not delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// The file that was not deleted.
    pub path: PathBuf,
    /// Why.
    pub message: String,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// When the sweep ran.
    pub swept_at: DateTime<Utc>,
    /// Files older than this were eligible for deletion.
    pub cutoff: DateTime<Utc>,
    /// Files that were deleted.
    pub deleted: Vec<PathBuf>,
    /// Total size of the deleted files.
    pub bytes_reclaimed: u64,
    /// Number of files young enough to keep.
    pub kept: usize,
    /// Files that were eligible but could not be deleted.
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(now: SystemTime, max_age: Duration) -> Self {
        let swept_at = DateTime::<Utc>::from(now);
        let cutoff = now
            .checked_sub(max_age)
            .map_or(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::from);
        Self {
            swept_at,
            cutoff,
            deleted: Vec::new(),
            bytes_reclaimed: 0,
            kept: 0,
            failures: Vec::new(),
        }
    }

    /// Number of files deleted.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Whether every eligible file was deleted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sweep `dirs`, deleting regular files whose modification time is more than
/// `max_age` before `now`.
///
/// Missing directories are skipped. Subdirectories and their contents are
/// never touched. Files with a modification time in the future are kept.
/// Per-file failures are recorded in the report rather than aborting.
///
/// # Errors
///
/// Returns an error if an existing directory cannot be listed.
pub fn sweep(dirs: &[PathBuf], max_age: Duration, now: SystemTime) -> io::Result<SweepReport> {
    let mut report = SweepReport::new(now, max_age);

    for dir in dirs {
        sweep_dir(dir, max_age, now, &mut report)?;
    }

    if report.deleted_count() > 0 {
        info!(
            deleted = report.deleted_count(),
            bytes = report.bytes_reclaimed,
            kept = report.kept,
            "Retention sweep removed expired files"
        );
    } else {
        debug!(kept = report.kept, "Retention sweep found nothing to remove");
    }

    Ok(report)
}

fn sweep_dir(
    dir: &Path,
    max_age: Duration,
    now: SystemTime,
    report: &mut SweepReport,
) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Skipping missing directory");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            // Removed by someone else since the listing.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                report.failures.push(SweepFailure {
                    path,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);

        if !expired {
            report.kept += 1;
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed expired file");
                report.bytes_reclaimed += metadata.len();
                report.deleted.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove expired file");
                report.failures.push(SweepFailure {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(())
}
