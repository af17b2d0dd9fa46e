//! `ldconvert` - Telemetry log to MoTeC `.ld` conversion orchestrator
//!
//! This library drives an external converter program: it validates a
//! conversion request, invokes the converter with a bounded lifetime,
//! classifies the outcome, finds the produced artifact and cleans up after
//! failures. A retention sweep keeps the input and output directories from
//! growing without bound.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod args;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod outcome;
pub mod output;
pub mod request;
pub mod retention;
pub mod runner;
pub mod staging;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use orchestrator::Orchestrator;
pub use output::Artifact;
pub use request::{ConversionRequest, LogKind, Metadata};
pub use retention::SweepReport;
pub use runner::{Invoker, ProcessRunner};
