//! Artifact naming and location.
//!
//! The converter is told where to write via `--output`, but older converter
//! builds ignore the flag and write next to the source log instead. The
//! resolver accepts either location and always leaves the artifact in the
//! output directory under the resolved name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Canonical extension of the MoTeC i2 log format, without the dot.
pub const CANONICAL_EXTENSION: &str = "ld";

/// A finalized conversion artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Absolute path of the artifact.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// BLAKE3 hash of the contents, hex encoded.
    pub content_hash: String,
    /// Where the artifact was found if the converter ignored `--output`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocated_from: Option<PathBuf>,
    /// Whether the artifact is smaller than the plausible minimum.
    pub undersized: bool,
}

impl Artifact {
    /// The artifact's file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Resolve the artifact file name.
///
/// An explicit name keeps only its final path component and carries the
/// canonical extension exactly once. Without one, the source log's stem is
/// used.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if no usable name can be derived.
pub fn resolve_output_name(explicit: Option<&str>, source: &Path) -> Result<String> {
    let base = match explicit {
        Some(name) => Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::invalid_request(format!("output filename '{name}' is not a file name"))
            })?,
        None => source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::invalid_request(format!(
                    "cannot derive an output name from {}",
                    source.display()
                ))
            })?,
    };

    Ok(with_canonical_extension(&base))
}

fn with_canonical_extension(name: &str) -> String {
    let suffix_len = CANONICAL_EXTENSION.len() + 1;
    let stem = match name.len().checked_sub(suffix_len) {
        Some(split)
            if name.is_char_boundary(split)
                && name[split..].eq_ignore_ascii_case(&format!(".{CANONICAL_EXTENSION}")) =>
        {
            &name[..split]
        }
        _ => name,
    };
    format!("{stem}.{CANONICAL_EXTENSION}")
}

/// Where the converter writes when it ignores `--output`.
#[must_use]
pub fn fallback_path(source: &Path) -> PathBuf {
    source.with_extension(CANONICAL_EXTENSION)
}

/// Whether `a` and `b` name the same file.
#[must_use]
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Locate the artifact after a successful run and finalize it at `resolved`.
///
/// A source log that already carries the canonical extension is its own
/// fallback path; it is never taken for the artifact.
///
/// # Errors
///
/// Returns [`Error::OutputMissing`] if neither the resolved nor the fallback
/// location holds a file, or an I/O error if the fallback cannot be moved.
pub fn locate_artifact(resolved: &Path, source: &Path, min_size_bytes: u64) -> Result<Artifact> {
    let mut relocated_from = None;

    if !resolved.is_file() {
        let fallback = fallback_path(source);
        if !fallback.is_file() || is_same_file(&fallback, source) {
            return Err(Error::OutputMissing {
                path: resolved.to_path_buf(),
                fallback,
            });
        }
        info!(
            from = %fallback.display(),
            to = %resolved.display(),
            "Converter wrote next to the source log, moving artifact"
        );
        move_file(&fallback, resolved)?;
        relocated_from = Some(fallback);
    }

    let size_bytes = fs::metadata(resolved)?.len();
    let undersized = size_bytes < min_size_bytes;
    if undersized {
        warn!(
            path = %resolved.display(),
            size_bytes,
            min_size_bytes,
            "Artifact is suspiciously small"
        );
    }

    Ok(Artifact {
        path: resolved.to_path_buf(),
        size_bytes,
        content_hash: hash_file(resolved)?,
        relocated_from,
        undersized,
    })
}

/// Move a file, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = %e, "Rename failed, copying instead");
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derived_name_from_source_stem() {
        let name = resolve_output_name(None, Path::new("uploads/input/session1.log")).unwrap();
        assert_eq!(name, "session1.ld");
    }

    #[test]
    fn test_explicit_name_gets_extension() {
        assert_eq!(
            resolve_output_name(Some("race"), Path::new("a.log")).unwrap(),
            "race.ld"
        );
    }

    #[test]
    fn test_explicit_name_extension_not_doubled() {
        assert_eq!(
            resolve_output_name(Some("race.ld"), Path::new("a.log")).unwrap(),
            "race.ld"
        );
        assert_eq!(
            resolve_output_name(Some("race.LD"), Path::new("a.log")).unwrap(),
            "race.ld"
        );
    }

    #[test]
    fn test_extension_appears_exactly_once() {
        for explicit in [None, Some("quali"), Some("quali.ld"), Some("quali.Ld")] {
            let name = resolve_output_name(explicit, Path::new("in/quali.csv")).unwrap();
            assert_eq!(name, "quali.ld");
        }
    }

    #[test]
    fn test_explicit_name_keeps_only_file_component() {
        assert_eq!(
            resolve_output_name(Some("../../etc/evil"), Path::new("a.log")).unwrap(),
            "evil.ld"
        );
    }

    #[test]
    fn test_unusable_explicit_name() {
        assert!(resolve_output_name(Some(".."), Path::new("a.log")).is_err());
    }

    #[test]
    fn test_fallback_path() {
        assert_eq!(
            fallback_path(Path::new("/in/20240101_120000_run.csv")),
            PathBuf::from("/in/20240101_120000_run.ld")
        );
    }

    #[test]
    fn test_locate_at_resolved_path() {
        let dir = tempdir().unwrap();
        let resolved = dir.path().join("out.ld");
        fs::write(&resolved, vec![0u8; 2048]).unwrap();

        let artifact = locate_artifact(&resolved, &dir.path().join("in.csv"), 1024).unwrap();
        assert_eq!(artifact.path, resolved);
        assert_eq!(artifact.size_bytes, 2048);
        assert!(!artifact.undersized);
        assert!(artifact.relocated_from.is_none());
        assert_eq!(artifact.content_hash, blake3::hash(&[0u8; 2048]).to_hex().to_string());
        assert!(resolved.exists());
    }

    #[test]
    fn test_locate_moves_fallback() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let source = input.path().join("run.csv");
        let fallback = input.path().join("run.ld");
        fs::write(&fallback, vec![1u8; 4096]).unwrap();
        let resolved = output.path().join("race.ld");

        let artifact = locate_artifact(&resolved, &source, 1024).unwrap();
        assert_eq!(artifact.path, resolved);
        assert_eq!(artifact.relocated_from, Some(fallback.clone()));
        assert!(resolved.is_file());
        assert!(!fallback.exists());
    }

    #[test]
    fn test_locate_missing_everywhere() {
        let dir = tempdir().unwrap();
        let err = locate_artifact(&dir.path().join("out.ld"), &dir.path().join("in.csv"), 0)
            .unwrap_err();
        assert!(matches!(err, Error::OutputMissing { .. }));
    }

    #[test]
    fn test_source_with_ld_extension_is_not_taken_as_artifact() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let source = input.path().join("lap.ld");
        fs::write(&source, vec![3u8; 4096]).unwrap();

        let err = locate_artifact(&output.path().join("lap.ld"), &source, 1024).unwrap_err();

        assert!(matches!(err, Error::OutputMissing { .. }));
        assert!(source.exists());
        assert_eq!(fs::read(&source).unwrap().len(), 4096);
    }

    #[test]
    fn test_is_same_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lap.ld");
        fs::write(&path, b"LD").unwrap();

        assert!(is_same_file(&path, &path));
        assert!(is_same_file(&path, &dir.path().join(".").join("lap.ld")));
        assert!(!is_same_file(&path, &dir.path().join("other.ld")));
    }

    #[test]
    fn test_small_artifact_is_flagged_not_rejected() {
        let dir = tempdir().unwrap();
        let resolved = dir.path().join("tiny.ld");
        fs::write(&resolved, b"LD").unwrap();

        let artifact = locate_artifact(&resolved, &dir.path().join("tiny.csv"), 1024).unwrap();
        assert!(artifact.undersized);
        assert_eq!(artifact.size_bytes, 2);
        assert!(resolved.exists());
    }

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact {
            path: PathBuf::from("/out/session1.ld"),
            size_bytes: 0,
            content_hash: String::new(),
            relocated_from: None,
            undersized: true,
        };
        assert_eq!(artifact.file_name(), "session1.ld");
    }
}
