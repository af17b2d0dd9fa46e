//! Command-line interface for ldconvert.
//!
//! This module provides the CLI structure for the `ldconv` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ConvertCommand, ConvertRequestCommand, SweepCommand};

/// ldconv - Convert vehicle telemetry logs to MoTeC i2 `.ld` files
///
/// Runs the configured converter with a bounded lifetime, places the result
/// in the output directory, and cleans up after failed or expired runs.
#[derive(Debug, Parser)]
#[command(name = "ldconv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a telemetry log
    Convert(ConvertCommand),

    /// Convert from a JSON request document
    ConvertRequest(ConvertRequestCommand),

    /// Delete expired inputs and artifacts
    Sweep(SweepCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
