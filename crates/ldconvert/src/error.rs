//! Error types for ldconvert.
//!
//! This module defines all error types used throughout the ldconvert crate.
//! Every variant renders as a single line suitable for direct display; the
//! multi-line diagnostics a converter may print are only ever logged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for ldconvert operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Conversion Errors ===
    /// The request was malformed or incomplete. Detected before any process
    /// is launched.
    #[error("invalid conversion request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The external converter could not be started.
    #[error("failed to launch converter '{program}': {message}")]
    LaunchFailure {
        /// The program that was being started.
        program: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The external converter exceeded its wall-clock bound and was killed.
    #[error("conversion timed out after {} seconds", .timeout.as_secs_f64())]
    ConversionTimeout {
        /// The configured bound.
        timeout: Duration,
    },

    /// The external converter exited with a non-zero status.
    #[error("conversion failed (exit code {exit_code}): {message}")]
    ConversionFailed {
        /// Exit code of the converter, `-1` if it was terminated by a signal.
        exit_code: i32,
        /// Concise diagnostic extracted from the converter's output.
        message: String,
    },

    /// The converter reported success but no artifact was found.
    #[error("output file was not created: {path}")]
    OutputMissing {
        /// The resolved output path.
        path: PathBuf,
        /// The source-adjacent location that was also checked.
        fallback: PathBuf,
    },

    // === Staging Errors ===
    /// An input file could not be staged into the input directory.
    #[error("failed to stage {path}: {source}")]
    Staging {
        /// The file being staged.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for ldconvert operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a launch failure error.
    #[must_use]
    pub fn launch_failure(program: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LaunchFailure {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error belongs to the conversion taxonomy (as opposed to
    /// configuration or environment I/O).
    #[must_use]
    pub fn is_conversion_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::LaunchFailure { .. }
                | Self::ConversionTimeout { .. }
                | Self::ConversionFailed { .. }
                | Self::OutputMissing { .. }
        )
    }

    /// Check if resubmitting the same request could plausibly succeed.
    ///
    /// Nothing is retried automatically; this only informs the caller.
    #[must_use]
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(self, Self::ConversionTimeout { .. })
    }
}
