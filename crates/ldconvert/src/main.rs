//! `ldconv` - CLI for ldconvert
//!
//! This binary converts telemetry logs to MoTeC `.ld` files through the
//! configured converter, and runs the retention sweep.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use ldconvert::cli::{Cli, Command, ConfigCommand, ConvertCommand, ConvertRequestCommand};
use ldconvert::{init_logging, Artifact, Config, ConversionRequest, Orchestrator, SweepReport};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", one_line(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config;

    match cli.command {
        Command::Convert(cmd) => handle_convert(Config::load_from(config_path)?, &cmd).await,
        Command::ConvertRequest(cmd) => {
            handle_convert_request(Config::load_from(config_path)?, &cmd).await
        }
        Command::Sweep(cmd) => handle_sweep(Config::load_from(config_path)?, cmd.json),
        Command::Config(cmd) => handle_config(config_path, cmd),
    }
}

fn with_timeout(mut config: Config, timeout: Option<u64>) -> Config {
    if let Some(secs) = timeout {
        config.converter.timeout_secs = secs;
    }
    config
}

async fn handle_convert(config: Config, cmd: &ConvertCommand) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(with_timeout(config, cmd.timeout))?;

    // Reject the request before anything is copied.
    cmd.to_request(cmd.log.clone(), cmd.dbc.clone()).check_inputs()?;

    let request = if cmd.in_place {
        cmd.to_request(cmd.log.clone(), cmd.dbc.clone())
    } else {
        let source = orchestrator.stage(&cmd.log)?;
        let dictionary = cmd
            .dbc
            .as_deref()
            .map(|dbc| orchestrator.stage(dbc))
            .transpose()?;
        cmd.to_request(source, dictionary)
    };

    print_outcome(orchestrator.convert(&request).await, cmd.json)
}

async fn handle_convert_request(config: Config, cmd: &ConvertRequestCommand) -> anyhow::Result<()> {
    let json = fs::read_to_string(&cmd.file)
        .with_context(|| format!("failed to read request {}", cmd.file.display()))?;
    let request = ConversionRequest::from_json(&json)?;
    let orchestrator = Orchestrator::new(with_timeout(config, cmd.timeout))?;

    print_outcome(orchestrator.convert(&request).await, cmd.json)
}

fn print_outcome(outcome: ldconvert::Result<Artifact>, json: bool) -> anyhow::Result<()> {
    match outcome {
        Ok(artifact) => {
            if json {
                let report = serde_json::json!({
                    "success": true,
                    "output_file": artifact.file_name(),
                    "output_path": artifact.path,
                    "size_bytes": artifact.size_bytes,
                    "blake3": artifact.content_hash,
                    "undersized": artifact.undersized,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", artifact.path.display());
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let report = serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                    "retryable": e.is_retryable_by_caller(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e.into())
        }
    }
}

fn handle_sweep(config: Config, json: bool) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config)?;
    let report = orchestrator.sweep_expired()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sweep(&report);
    }
    Ok(())
}

fn print_sweep(report: &SweepReport) {
    println!("Retention sweep");
    println!("---------------");
    println!("Cutoff:          {}", report.cutoff.to_rfc3339());
    println!("Deleted:         {}", report.deleted_count());
    println!("Bytes reclaimed: {}", report.bytes_reclaimed);
    println!("Kept:            {}", report.kept);
    for failure in &report.failures {
        println!("Not deleted:     {} ({})", failure.path.display(), failure.message);
    }
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Converter]");
                println!("  Program:            {}", config.converter.program.display());
                match &config.converter.script {
                    Some(script) => println!("  Script:             {}", script.display()),
                    None => println!("  Script:             (none)"),
                }
                println!(
                    "  Project root:       {}",
                    config.converter.project_root.display()
                );
                println!("  Timeout (secs):     {}", config.converter.timeout_secs);
                println!();
                println!("[Storage]");
                println!("  Input directory:    {}", config.input_dir().display());
                println!("  Output directory:   {}", config.output_dir().display());
                println!();
                println!("[Artifacts]");
                println!("  Min size (bytes):   {}", config.artifacts.min_size_bytes);
                println!();
                println!("[Retention]");
                println!("  Max age (hours):    {}", config.retention.max_age_hours);
            }
        }
        ConfigCommand::Path => {
            println!("{}", path.unwrap_or_else(Config::default_config_path).display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path))?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

/// Render an error chain on one line, skipping causes already quoted by
/// their parent.
fn one_line(err: &anyhow::Error) -> String {
    let mut line = err.to_string();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !line.contains(&text) {
            line.push_str(": ");
            line.push_str(&text);
        }
    }
    line
}
