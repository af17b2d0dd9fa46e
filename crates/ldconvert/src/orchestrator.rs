//! Conversion orchestration.
//!
//! [`Orchestrator::convert`] runs one conversion end to end:
//!
//! 1. resolve the artifact name and path
//! 2. check the request against the filesystem and build the arguments
//! 3. run the converter, bounded by a timeout
//! 4. classify the outcome
//! 5. locate the artifact, moving it out of the source directory if needed
//!
//! Any failure in steps 2-5 removes whatever is at the resolved path, so a
//! failed conversion never leaves a half-written artifact behind.
//! [`Orchestrator::sweep_expired`] applies the retention rule to the input
//! and output directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing::{debug, info, info_span, Instrument};

use crate::args::build_arguments;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::outcome::interpret;
use crate::output::{is_same_file, locate_artifact, resolve_output_name, Artifact};
use crate::request::ConversionRequest;
use crate::retention::{sweep, SweepReport};
use crate::runner::{ExternalInvocation, Invoker, ProcessRunner};
use crate::staging::stage_input;

/// Runs conversions against one configuration.
///
/// The orchestrator holds no mutable state; share it freely between tasks.
#[derive(Debug)]
pub struct Orchestrator<I = ProcessRunner> {
    config: Config,
    invoker: I,
}

impl Orchestrator<ProcessRunner> {
    /// Create an orchestrator that runs the configured converter as a child
    /// process.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_invoker(config, ProcessRunner::new())
    }
}

impl<I: Invoker> Orchestrator<I> {
    /// Create an orchestrator with a custom invoker.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_invoker(config: Config, invoker: I) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, invoker })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns one of [`Error::InvalidRequest`], [`Error::LaunchFailure`],
    /// [`Error::ConversionTimeout`], [`Error::ConversionFailed`] or
    /// [`Error::OutputMissing`], or an I/O error if the output directory is
    /// unusable.
    pub async fn convert(&self, request: &ConversionRequest) -> Result<Artifact> {
        self.convert_with_timeout(request, self.config.timeout())
            .await
    }

    /// Convert with an explicit timeout, for example a shorter bound for a
    /// quick preview conversion.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::convert`].
    pub async fn convert_with_timeout(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<Artifact> {
        let span = info_span!(
            "convert",
            source = %request.source.display(),
            kind = %request.kind
        );

        async move {
            let output_dir = self.ensure_output_dir()?;
            let name = resolve_output_name(request.explicit_output_name(), &request.source)?;
            let output_path = output_dir.join(name);

            // Checked before the cleanup guard, which would delete the log.
            if is_same_file(&request.source, &output_path) {
                return Err(Error::invalid_request(format!(
                    "output {} would overwrite the source log",
                    output_path.display()
                )));
            }

            match self.run(request, &output_path, timeout).await {
                Ok(artifact) => {
                    info!(
                        output = %artifact.path.display(),
                        size_bytes = artifact.size_bytes,
                        "Conversion finished"
                    );
                    Ok(artifact)
                }
                Err(e) => {
                    discard_partial(&output_path);
                    info!(error = %e, "Conversion failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &ConversionRequest,
        output_path: &Path,
        timeout: Duration,
    ) -> Result<Artifact> {
        request.check_inputs()?;
        let request = absolute_inputs(request)?;
        let args = build_arguments(&request, output_path)?;

        // A leftover from an earlier run with the same name must not be
        // mistaken for this run's result.
        discard_stale(output_path)?;

        let invocation = ExternalInvocation::new(&self.config.converter, args, timeout);
        let completed = self.invoker.invoke(invocation).await?;
        interpret(&completed)?;

        locate_artifact(
            output_path,
            &request.source,
            self.config.artifacts.min_size_bytes,
        )
    }

    /// Copy an uploaded file into the input directory under a
    /// timestamp-qualified name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be copied.
    pub fn stage(&self, upload: &Path) -> Result<PathBuf> {
        stage_input(upload, &self.config.input_dir(), Local::now())
    }

    /// Delete files older than the retention age from the input and output
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing directory cannot be listed.
    pub fn sweep_expired(&self) -> Result<SweepReport> {
        let dirs = [self.config.input_dir(), self.config.output_dir()];
        Ok(sweep(&dirs, self.config.retention_age(), SystemTime::now())?)
    }

    fn ensure_output_dir(&self) -> Result<PathBuf> {
        let dir = self.config.output_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::DirectoryCreate {
            path: dir.clone(),
            source: e,
        })?;
        Ok(fs::canonicalize(&dir)?)
    }
}

/// The converter runs in the project root, so relative input paths given by
/// the caller must be made absolute first.
fn absolute_inputs(request: &ConversionRequest) -> Result<ConversionRequest> {
    let mut request = request.clone();
    request.source = fs::canonicalize(&request.source)?;
    if request.kind.requires_dictionary() {
        let dictionary = fs::canonicalize(request.required_dictionary()?)?;
        request.dictionary = Some(dictionary);
    }
    Ok(request)
}

fn discard_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of a partial artifact. Never masks the original error.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partial artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove partial artifact"),
    }
}
