//! Configuration management and validation.
//!
//! Provides the configuration surface for batch processing: source/output
//! locations, staging mode, export destination, and warehouse settings.
//! Configuration is loaded from a JSON file and can be overridden by CLI
//! arguments before validation.

use crate::constants::{DEFAULT_LOG_FILE, DEFAULT_STAGING_DIR};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a batch's staging store is backed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// In-memory store; batches run strictly sequentially
    Memory,
    /// One uniquely named database file per batch; batches run in parallel
    File,
}

impl StagingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingMode::Memory => "memory",
            StagingMode::File => "file",
        }
    }
}

impl fmt::Display for StagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where exported result sets are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Delimited files in the output directory's CSV subfolder
    Csv,
    /// Upload jobs against the analytical warehouse
    Warehouse,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Csv => "csv",
            Destination::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disposition for warehouse table writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Append rows to the destination table, creating it if absent
    Append,
    /// Drop and re-create the destination table before inserting
    Replace,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch discovery and dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Directory scanned for input citation XML batches
    pub source_dir: PathBuf,

    /// Directory receiving exported files (CSV destination)
    pub output_dir: PathBuf,

    /// Export destination for every batch in the run
    pub destination: Destination,

    /// Upper bound on concurrently processed batches in file staging mode.
    /// 0 selects the number of available cores.
    pub max_concurrent_batches: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            destination: Destination::Csv,
            max_concurrent_batches: 0,
        }
    }
}

/// Staging store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Backing mode for per-batch staging stores
    pub mode: StagingMode,

    /// Scratch directory for file-backed staging databases; recreated at the
    /// start of a run and removed at the end
    pub scratch_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            mode: StagingMode::Memory,
            scratch_dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }
}

/// Warehouse destination settings
///
/// Credentials are provisioned externally; the access token arrives here
/// already minted and is used as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Warehouse project identifier
    pub project: String,

    /// Dataset that receives the per-batch tables
    pub dataset: String,

    /// Configured write disposition for uploads
    pub write_mode: WriteMode,

    /// Optional fixed destination table. When set, every batch appends to
    /// this table regardless of `write_mode`.
    pub fixed_table: Option<String>,

    /// Override for the warehouse API base URL (emulators, test servers)
    pub api_base: Option<String>,

    /// Pre-provisioned bearer token for warehouse requests
    pub access_token: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            dataset: String::new(),
            write_mode: WriteMode::Append,
            fixed_table: None,
            api_base: None,
            access_token: String::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level for the stderr layer (trace, debug, info, warn, error)
    pub level: String,

    /// Persistent log file capturing all exceptions for postmortem review
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

/// Global configuration for MEDLINE batch processing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch discovery and dispatch settings
    pub processing: ProcessingConfig,

    /// Staging store settings
    pub staging: StagingConfig,

    /// Warehouse destination settings
    pub warehouse: WarehouseConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Create a configuration with explicit source and output directories
    pub fn new(source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            processing: ProcessingConfig {
                source_dir,
                output_dir,
                ..ProcessingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("failed to read config file '{}'", path.display()), e)
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            Error::configuration(format!(
                "invalid config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Set the export destination
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.processing.destination = destination;
        self
    }

    /// Set the staging mode
    pub fn with_staging_mode(mut self, mode: StagingMode) -> Self {
        self.staging.mode = mode;
        self
    }

    /// Effective batch-level concurrency budget
    pub fn concurrency_budget(&self) -> usize {
        match self.processing.max_concurrent_batches {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// Validate the configuration for the selected destination
    pub fn validate(&self) -> Result<()> {
        if !self.processing.source_dir.is_dir() {
            return Err(Error::configuration(format!(
                "source directory does not exist: {}",
                self.processing.source_dir.display()
            )));
        }

        if self.processing.destination == Destination::Warehouse {
            if self.warehouse.project.trim().is_empty() {
                return Err(Error::configuration(
                    "warehouse destination requires a project identifier",
                ));
            }
            if self.warehouse.dataset.trim().is_empty() {
                return Err(Error::configuration(
                    "warehouse destination requires a dataset identifier",
                ));
            }
        }

        if let Some(table) = &self.warehouse.fixed_table {
            if table.trim().is_empty() {
                return Err(Error::configuration(
                    "fixed warehouse table name must not be empty when set",
                ));
            }
        }

        Ok(())
    }
}
