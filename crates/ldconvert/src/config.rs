//! Configuration management for ldconvert.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults. The
//! resulting [`Config`] is passed explicitly into the orchestrator; nothing in
//! the crate reads process-wide configuration on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "ldconvert";

/// Environment variable prefix.
const ENV_PREFIX: &str = "LDCONVERT_";

/// Retention must exceed the invocation timeout by at least this factor, so
/// the sweep can never reach a file that belongs to a running conversion.
pub const MIN_RETENTION_TIMEOUT_RATIO: u64 = 10;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `LDCONVERT_`, nested with `__`)
/// 2. TOML config file at `~/.config/ldconvert/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External converter configuration.
    pub converter: ConverterConfig,
    /// Input and output directories.
    pub storage: StorageConfig,
    /// Artifact checks.
    pub artifacts: ArtifactConfig,
    /// Retention sweep configuration.
    pub retention: RetentionConfig,
}

/// External converter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Program to execute (an interpreter or a standalone converter binary).
    pub program: PathBuf,
    /// Script passed as the first argument, relative to `project_root`.
    /// `None` when `program` is the converter itself.
    pub script: Option<PathBuf>,
    /// Working directory for every invocation.
    pub project_root: PathBuf,
    /// Wall-clock bound for a full conversion, in seconds.
    pub timeout_secs: u64,
}

/// Input and output directories.
///
/// Relative paths are resolved against `converter.project_root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding staged input logs and signal dictionaries.
    pub input_dir: PathBuf,
    /// Directory holding finished artifacts.
    pub output_dir: PathBuf,
}

/// Artifact checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Artifacts smaller than this are accepted but logged as suspicious.
    pub min_size_bytes: u64,
}

/// Retention sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Files older than this many hours are deleted by the sweep.
    pub max_age_hours: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            script: Some(PathBuf::from("motec_log_generator.py")),
            project_root: PathBuf::from("."),
            timeout_secs: 120,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("uploads/input"),
            output_dir: PathBuf::from("uploads/output"),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 1024,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_age_hours: 24 }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.converter.program.as_os_str().is_empty() {
            return Err(Error::config_validation("converter.program must not be empty"));
        }

        if self.converter.timeout_secs == 0 {
            return Err(Error::config_validation(
                "converter.timeout_secs must be greater than 0",
            ));
        }

        if self.retention.max_age_hours == 0 {
            return Err(Error::config_validation(
                "retention.max_age_hours must be greater than 0",
            ));
        }

        let retention_secs = self.retention.max_age_hours.saturating_mul(3600);
        let required = self
            .converter
            .timeout_secs
            .saturating_mul(MIN_RETENTION_TIMEOUT_RATIO);
        if retention_secs < required {
            return Err(Error::config_validation(format!(
                "retention.max_age_hours ({}h) must be at least {}x converter.timeout_secs ({}s)",
                self.retention.max_age_hours,
                MIN_RETENTION_TIMEOUT_RATIO,
                self.converter.timeout_secs
            )));
        }

        Ok(())
    }

    /// Get the invocation timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.converter.timeout_secs)
    }

    /// Get the retention age as a Duration.
    #[must_use]
    pub fn retention_age(&self) -> Duration {
        Duration::from_secs(self.retention.max_age_hours.saturating_mul(3600))
    }

    /// Get the input directory, resolved against the project root.
    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.anchor(&self.storage.input_dir)
    }

    /// Get the output directory, resolved against the project root.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.anchor(&self.storage.output_dir)
    }

    fn anchor(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.converter.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.converter.program, PathBuf::from("python3"));
        assert_eq!(
            config.converter.script,
            Some(PathBuf::from("motec_log_generator.py"))
        );
        assert_eq!(config.converter.timeout_secs, 120);
        assert_eq!(config.artifacts.min_size_bytes, 1024);
        assert_eq!(config.retention.max_age_hours, 24);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.converter.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let mut config = Config::default();
        config.retention.max_age_hours = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_age_hours"));
    }

    #[test]
    fn test_validate_retention_must_dwarf_timeout() {
        let mut config = Config::default();
        config.retention.max_age_hours = 1;
        config.converter.timeout_secs = 600;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("at least 10x"));

        config.converter.timeout_secs = 360;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_program() {
        let mut config = Config::default();
        config.converter.program = PathBuf::new();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.retention_age(), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_relative_dirs_anchor_to_project_root() {
        let mut config = Config::default();
        config.converter.project_root = PathBuf::from("/srv/ldconvert");

        assert_eq!(
            config.input_dir(),
            PathBuf::from("/srv/ldconvert/uploads/input")
        );
        assert_eq!(
            config.output_dir(),
            PathBuf::from("/srv/ldconvert/uploads/output")
        );
    }

    #[test]
    fn test_absolute_dirs_are_kept() {
        let mut config = Config::default();
        config.storage.output_dir = PathBuf::from("/var/lib/ld");

        assert_eq!(config.output_dir(), PathBuf::from("/var/lib/ld"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("ldconvert"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[converter]\nprogram = \"motec-gen\"\ntimeout_secs = 60\n\n[artifacts]\nmin_size_bytes = 10\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.converter.program, PathBuf::from("motec-gen"));
        assert_eq!(config.converter.timeout_secs, 60);
        assert_eq!(config.artifacts.min_size_bytes, 10);
        assert_eq!(config.retention.max_age_hours, 24);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[converter]\ntimeout_secs = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("timeout_secs"));
        assert!(json.contains("min_size_bytes"));
    }

    #[test]
    fn test_retention_config_deserialize() {
        let retention: RetentionConfig = serde_json::from_str(r#"{"max_age_hours": 48}"#).unwrap();
        assert_eq!(retention.max_age_hours, 48);
    }
}
