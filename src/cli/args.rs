//! Command-line argument definitions for the MEDLINE processor
//!
//! This module defines the CLI interface using the clap derive API. The
//! `process` command takes a batch selection plus overrides for the values
//! normally read from the configuration file.

use crate::constants::SOURCE_SUFFIX;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// CLI arguments for the MEDLINE citation batch processor
///
/// Normalizes MEDLINE/PubMed citation XML batches into a relational staging
/// schema and exports them as CSV files or analytical-warehouse tables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "medline-processor",
    version,
    about = "Normalize MEDLINE/PubMed citation XML batches into CSV or warehouse exports",
    long_about = "Processes MEDLINE/PubMed citation XML batches: each batch is normalized \
                  into four flat relations inside its own embedded staging store, then \
                  exported as two delimited files or uploaded concurrently to two \
                  analytical-warehouse tables. Batches are independent; in file staging \
                  mode they run in parallel across a bounded worker pool."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Normalize and export citation batches (main command)
    Process(ProcessArgs),
}

/// Arguments for the process command
#[derive(Debug, Clone, Parser)]
pub struct ProcessArgs {
    /// Which batches to process
    ///
    /// An explicit `.xml` file name processes that one batch (it must exist
    /// in the source directory); a number processes the first N batches;
    /// `all` processes every batch in the source directory.
    #[arg(value_name = "SELECTION")]
    pub selection: BatchSelection,

    /// Path to the JSON configuration file
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_value = "configuration.json",
        help = "Path to the JSON configuration file"
    )]
    pub config_file: PathBuf,

    /// Override the configured source directory
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    pub source_dir: Option<PathBuf>,

    /// Override the configured output directory
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Override the concurrency budget for file staging mode
    #[arg(short = 'w', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl ProcessArgs {
    /// Effective log level from the verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// How the run's input batches are selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSelection {
    /// Every `.xml` batch in the source directory
    All,
    /// The first N batches in name order
    Count(usize),
    /// One explicitly named batch file
    Named(String),
}

impl FromStr for BatchSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(BatchSelection::All);
        }
        if let Ok(count) = s.parse::<usize>() {
            if count == 0 {
                return Err("batch count must be at least 1".to_string());
            }
            return Ok(BatchSelection::Count(count));
        }
        if s.ends_with(SOURCE_SUFFIX) {
            return Ok(BatchSelection::Named(s.to_string()));
        }
        Err(format!(
            "selection must be an {SOURCE_SUFFIX} file name, a positive count, or 'all'"
        ))
    }
}
