//! MEDLINE Processor Library
//!
//! A Rust library for normalizing MEDLINE/PubMed citation XML batches into a
//! relational staging schema and exporting the result as CSV files or
//! analytical-warehouse upload jobs.
//!
//! This library provides tools for:
//! - Parsing PubMed article-set XML into a tolerant tagged-value document
//! - Flattening irregular citation substructures into four staged relations
//! - Per-batch embedded SQLite staging with idempotent, conflict-safe inserts
//! - Exporting denormalized mesh and full-citation result sets
//! - Concurrent per-batch uploads and bounded batch-level parallelism

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod citation_parser;
        pub mod export;
        pub mod normalizer;
        pub mod orchestrator;
        pub mod pipeline;
        pub mod staging;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::BatchSummary;
pub use config::Config;

/// Result type alias for the MEDLINE processor
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for MEDLINE processing operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Citation XML could not be parsed
    #[error("XML format error in file '{file}': {message}")]
    XmlFormat { file: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A single citation record was malformed beyond what the extractors tolerate
    #[error("Record error: {message}")]
    Record { message: String },

    /// Staging store operation failed
    #[error("Staging error: {message}")]
    Staging {
        message: String,
        #[source]
        source: rusqlite::Error,
    },

    /// `define_schema` was called twice on the same staging store
    #[error("Staging schema is already defined for this store")]
    SchemaExists,

    /// The staging store was used after `close`
    #[error("Staging store is closed")]
    StoreClosed,

    /// CSV export error
    #[error("CSV export error for '{path}': {source}")]
    CsvExport {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Warehouse upload was rejected or failed
    #[error("Upload error for table '{table}': {message}")]
    Upload { table: String, message: String },

    /// HTTP transport failure while talking to the warehouse
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    /// A batch worker task failed to run to completion
    #[error("Worker error: {message}")]
    Worker { message: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create an XML format error
    pub fn xml_format(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::XmlFormat {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a record-level error
    pub fn record(message: impl Into<String>) -> Self {
        Self::Record {
            message: message.into(),
        }
    }

    /// Create a staging error with context
    pub fn staging(message: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Staging {
            message: message.into(),
            source,
        }
    }

    /// Create an upload error
    pub fn upload(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upload {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Whether this error is scoped to a single citation record
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::Record { .. })
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::Staging {
            message: "staging store operation failed".to_string(),
            source: error,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Self::CsvExport {
            path: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Http {
            message: "warehouse request failed".to_string(),
            source: error,
        }
    }
}
