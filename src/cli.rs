// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `batchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchrun",
    version,
    about = "Run a batch of external simulation runs with bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Run numbers to execute every staged run with. Without any, each run
    /// executes once with no run number.
    #[arg(value_name = "RUN_NUMBER")]
    pub run_numbers: Vec<String>,

    /// Path to the batch file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override `[parameters].async_runs`.
    #[arg(long, value_name = "N")]
    pub async_runs: Option<u32>,

    /// Override `[parameters].output_dir`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only execute runs holding this value. Repeatable.
    #[arg(long = "filter", value_name = "VALUE")]
    pub filters: Vec<String>,

    /// With several `--filter` values, require all of them instead of any.
    #[arg(long)]
    pub match_all: bool,

    /// Print run output to stdout, prefixed with each run's label, instead
    /// of writing one file per run.
    #[arg(long)]
    pub stream: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the planned commands, but don't spawn anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
