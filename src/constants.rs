//! Application constants for the MEDLINE processor
//!
//! This module contains file-naming conventions, default paths, and
//! warehouse upload parameters used throughout the application.

// =============================================================================
// Source and Output Naming
// =============================================================================

/// File extension that identifies an input citation batch
pub const SOURCE_SUFFIX: &str = ".xml";

/// Subdirectory (inside the source directory) that archives processed batches
pub const ARCHIVE_DIR_NAME: &str = "converted";

/// Subdirectory (inside the output directory) that receives CSV exports
pub const CSV_SUBDIR: &str = "CSV";

/// Suffix appended to the batch stem for the mesh result set
pub const MESH_SUFFIX: &str = "_mesh";

// =============================================================================
// Run Bookkeeping
// =============================================================================

/// Append-only ledger of per-batch run results
pub const EXECUTION_HISTORY_FILE: &str = "execution_history.csv";

/// Header row for the execution-history ledger
pub const EXECUTION_HISTORY_FIELDS: &[&str] = &[
    "source_file",
    "destination",
    "staging_mode",
    "output_name",
    "elapsed_secs",
    "upload_secs",
    "run_date",
];

/// Timestamp format used in the ledger and the progress table
pub const RUN_DATE_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Default persistent log file for postmortem review
pub const DEFAULT_LOG_FILE: &str = "logs.log";

/// Default scratch directory for file-backed staging databases
pub const DEFAULT_STAGING_DIR: &str = "temporary";

// =============================================================================
// Warehouse Upload
// =============================================================================

/// Base URL of the BigQuery REST API
pub const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Rows per insertAll request; the API rejects oversized payloads
pub const INSERT_CHUNK_ROWS: usize = 500;
