//! CLI argument parsing for tracealign

use crate::config::{AlignConfig, FileDefaults};
use crate::error::AlignError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tracealign")]
#[command(version)]
#[command(about = "Checks source-declared service contracts against OpenTelemetry traces", long_about = None)]
pub struct Cli {
    /// Source tree to scan for @ServiceSpec annotations
    #[arg(long, value_name = "DIR")]
    pub path: PathBuf,

    /// OTLP-JSON trace file to align against
    #[arg(long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report_file: Option<PathBuf>,

    /// Log verbosity: debug|info|warn|error
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Alignment worker pool size
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Per-contract evaluation timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Trace ingestion memory budget in MiB
    #[arg(long, value_name = "MIB")]
    pub max_memory_mb: Option<u64>,

    /// Treat unknown annotation keys as errors
    #[arg(long)]
    pub strict: bool,

    /// Shorthand for --log-level debug
    #[arg(long)]
    pub debug: bool,

    /// Log per-file scan detail
    #[arg(long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Build the pipeline config: spec defaults, then `tracealign.toml` in the
/// source root, then explicit flags, highest priority last.
pub fn resolve_config(cli: &Cli) -> Result<AlignConfig, AlignError> {
    let mut config = AlignConfig::new(&cli.path, &cli.trace);
    if let Some(defaults) = FileDefaults::load(&cli.path)? {
        config.apply_defaults(&defaults)?;
    }
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(seconds) = cli.timeout {
        config.contract_timeout_ms = seconds.saturating_mul(1_000);
    }
    if let Some(mib) = cli.max_memory_mb {
        config.max_memory_bytes = mib.saturating_mul(1024 * 1024);
    }
    if cli.strict {
        config.strict_mode = true;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.parse().map_err(AlignError::InputInvalid)?;
    } else if cli.debug || cli.verbose {
        config.log_level = crate::config::LogLevel::Debug;
    }
    config.validate()?;
    Ok(config)
}
