//! Conversion request types.
//!
//! A [`ConversionRequest`] is an immutable description of one conversion:
//! which log to read, how it is encoded, at what frequency to resample, where
//! the result should be named, and which free-form session metadata to embed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Default resampling frequency in Hz.
pub const DEFAULT_FREQUENCY: f64 = 10.0;

/// Token identifying CAN-encoded logs.
const CAN_TOKEN: &str = "CAN";

/// The encoding of the source log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// Raw CAN frames, decoded with a signal dictionary.
    Can,
    /// A generic time-series log, identified by its upper-case token
    /// (for example `CSV` or `GENERIC`).
    TimeSeries(String),
}

impl LogKind {
    /// The token passed to the converter.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Can => CAN_TOKEN,
            Self::TimeSeries(token) => token,
        }
    }

    /// Whether this kind needs a signal dictionary.
    #[must_use]
    pub fn requires_dictionary(&self) -> bool {
        matches!(self, Self::Can)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for LogKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_uppercase();
        if token.is_empty() {
            return Err(Error::invalid_request("log kind must not be empty"));
        }
        if !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::invalid_request(format!(
                "log kind '{s}' must be a single word"
            )));
        }
        if token == CAN_TOKEN {
            Ok(Self::Can)
        } else {
            Ok(Self::TimeSeries(token))
        }
    }
}

impl Serialize for LogKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for LogKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Free-form session metadata (driver, venue, vehicle, ...).
///
/// Keys are kept sorted so the converter is always invoked with the same
/// flag order. Values that are empty or whitespace-only are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Create empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Entries with a non-blank value, in key order.
    pub fn present(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of entries with a non-blank value.
    #[must_use]
    pub fn present_len(&self) -> usize {
        self.present().count()
    }

    /// Whether there are no entries with a non-blank value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.present_len() == 0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let entries = raw.into_iter().filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, text))
        });
        Ok(entries.collect())
    }
}

/// A request to convert one telemetry log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Path to the source log.
    #[serde(rename = "log_path")]
    pub source: PathBuf,

    /// Encoding of the source log.
    #[serde(rename = "log_type")]
    pub kind: LogKind,

    /// Signal dictionary (DBC), required for CAN logs.
    #[serde(default, rename = "dbc_path", skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<PathBuf>,

    /// Target sample frequency in Hz.
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    /// Explicit output file name. Blank names are treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,

    /// Session metadata forwarded to the converter.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

fn default_frequency() -> f64 {
    DEFAULT_FREQUENCY
}

impl ConversionRequest {
    /// Create a request with default frequency and no optional fields.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, kind: LogKind) -> Self {
        Self {
            source: source.into(),
            kind,
            dictionary: None,
            frequency: DEFAULT_FREQUENCY,
            output_filename: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the signal dictionary.
    #[must_use]
    pub fn with_dictionary(mut self, path: impl Into<PathBuf>) -> Self {
        self.dictionary = Some(path.into());
        self
    }

    /// Set the target frequency.
    #[must_use]
    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set an explicit output file name.
    #[must_use]
    pub fn with_output_filename(mut self, name: impl Into<String>) -> Self {
        self.output_filename = Some(name.into());
        self
    }

    /// Set the session metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parse a request from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid request.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The explicit output name, if one was given and is not blank.
    #[must_use]
    pub fn explicit_output_name(&self) -> Option<&str> {
        self.output_filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Check the filesystem invariants that must hold at invocation time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the source log is missing, or if a
    /// CAN log has no signal dictionary or the dictionary does not exist.
    pub fn check_inputs(&self) -> Result<()> {
        if !self.source.is_file() {
            return Err(Error::invalid_request(format!(
                "input log file not found: {}",
                self.source.display()
            )));
        }

        if self.kind.requires_dictionary() {
            let dictionary = self.required_dictionary()?;
            if !dictionary.is_file() {
                return Err(Error::invalid_request(format!(
                    "signal dictionary not found: {}",
                    dictionary.display()
                )));
            }
        }

        Ok(())
    }

    /// The signal dictionary of a CAN request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if no dictionary was supplied.
    pub fn required_dictionary(&self) -> Result<&Path> {
        self.dictionary
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::invalid_request(format!(
                    "a signal dictionary (DBC) is required for {} logs",
                    self.kind
                ))
            })
    }
}
