//! Input staging.
//!
//! Uploaded logs and signal dictionaries are copied into the input directory
//! under a timestamp-qualified name, so that two sessions called `run.csv`
//! produce distinct artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::{Error, Result};

/// Timestamp prefix format for staged files.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The staged name of `file_name` at `at`.
#[must_use]
pub fn staged_name(file_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{file_name}", at.format(STAMP_FORMAT))
}

/// Copy `source` into `input_dir` under a timestamp-qualified name.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if `source` has no file name, and
/// [`Error::Staging`] if the copy fails.
pub fn stage_input(source: &Path, input_dir: &Path, at: DateTime<Local>) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::invalid_request(format!("{} is not a file", source.display()))
        })?;

    fs::create_dir_all(input_dir).map_err(|e| Error::DirectoryCreate {
        path: input_dir.to_path_buf(),
        source: e,
    })?;

    let target = input_dir.join(staged_name(&file_name, at));
    fs::copy(source, &target).map_err(|e| Error::Staging {
        path: source.to_path_buf(),
        source: e,
    })?;

    debug!(from = %source.display(), to = %target.display(), "Staged input");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 18, 14, 3, 9).unwrap()
    }

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name("run.csv", at()), "20240518_140309_run.csv");
    }

    #[test]
    fn test_stage_input_copies_file() {
        let upload = tempdir().unwrap();
        let root = tempdir().unwrap();
        let source = upload.path().join("session1.log");
        fs::write(&source, "t,speed\n0,0\n").unwrap();
        let input_dir = root.path().join("uploads/input");

        let staged = stage_input(&source, &input_dir, at()).unwrap();

        assert_eq!(staged, input_dir.join("20240518_140309_session1.log"));
        assert_eq!(fs::read_to_string(&staged).unwrap(), "t,speed\n0,0\n");
        assert!(source.exists());
    }

    #[test]
    fn test_stage_missing_source() {
        let root = tempdir().unwrap();
        let err = stage_input(Path::new("/nonexistent/run.csv"), root.path(), at()).unwrap_err();
        assert!(matches!(err, Error::Staging { .. }));
    }
}
