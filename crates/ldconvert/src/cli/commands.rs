//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::request::{ConversionRequest, LogKind, Metadata, DEFAULT_FREQUENCY};

/// Convert command arguments.
#[derive(Debug, Args)]
pub struct ConvertCommand {
    /// Telemetry log to convert
    pub log: PathBuf,

    /// Log kind (CAN, CSV, GENERIC, ...)
    #[arg(short, long, default_value = "CSV", value_parser = parse_kind)]
    pub kind: LogKind,

    /// Signal dictionary (DBC), required for CAN logs
    #[arg(long, value_name = "FILE")]
    pub dbc: Option<PathBuf>,

    /// Target sample frequency in Hz
    #[arg(short, long, default_value_t = DEFAULT_FREQUENCY)]
    pub frequency: f64,

    /// Output file name (the .ld extension is added if missing)
    #[arg(short, long, value_name = "NAME")]
    pub output: Option<String>,

    /// Session metadata passed to the converter
    #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,

    /// Override the configured timeout
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Convert the log where it is instead of staging a copy
    #[arg(long)]
    pub in_place: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

impl ConvertCommand {
    /// Build the request for the given (possibly staged) input files.
    #[must_use]
    pub fn to_request(&self, source: PathBuf, dictionary: Option<PathBuf>) -> ConversionRequest {
        let metadata: Metadata = self.meta.iter().cloned().collect();
        let mut request = ConversionRequest::new(source, self.kind.clone())
            .with_frequency(self.frequency)
            .with_metadata(metadata);
        if let Some(dictionary) = dictionary {
            request = request.with_dictionary(dictionary);
        }
        if let Some(name) = &self.output {
            request = request.with_output_filename(name.clone());
        }
        request
    }
}

/// Convert-request command arguments.
#[derive(Debug, Args)]
pub struct ConvertRequestCommand {
    /// JSON request document
    pub file: PathBuf,

    /// Override the configured timeout
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Sweep command arguments.
#[derive(Debug, Args)]
pub struct SweepCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn parse_kind(s: &str) -> Result<LogKind, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_meta(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("driver=Ana Silva").unwrap(),
            ("driver".to_string(), "Ana Silva".to_string())
        );
        assert_eq!(
            parse_meta("long_comment=a=b").unwrap(),
            ("long_comment".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_meta("event_name=").unwrap(),
            ("event_name".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_meta_invalid() {
        assert!(parse_meta("driver").is_err());
        assert!(parse_meta("=Ana").is_err());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("can").unwrap(), LogKind::Can);
        assert_eq!(
            parse_kind("generic").unwrap(),
            LogKind::TimeSeries("GENERIC".into())
        );
        assert!(parse_kind("").is_err());
    }

    #[test]
    fn test_to_request() {
        let cmd = ConvertCommand {
            log: PathBuf::from("run.csv"),
            kind: LogKind::Can,
            dbc: Some(PathBuf::from("car.dbc")),
            frequency: 50.0,
            output: Some("race".into()),
            meta: vec![("driver".into(), "Ana".into())],
            timeout: None,
            in_place: false,
            json: false,
        };

        let request = cmd.to_request(
            PathBuf::from("/in/20240101_000000_run.csv"),
            Some(PathBuf::from("/in/20240101_000000_car.dbc")),
        );

        assert_eq!(request.source, PathBuf::from("/in/20240101_000000_run.csv"));
        assert_eq!(
            request.dictionary,
            Some(PathBuf::from("/in/20240101_000000_car.dbc"))
        );
        assert_eq!(request.explicit_output_name(), Some("race"));
        assert!((request.frequency - 50.0).abs() < f64::EPSILON);
        assert_eq!(request.metadata.present().collect::<Vec<_>>(), vec![("driver", "Ana")]);
    }
}
