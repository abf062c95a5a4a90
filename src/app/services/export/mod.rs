//! Export/upload sink for staged batches
//!
//! Reads a batch's staged relations back out as two denormalized result
//! sets and delivers them to the configured destination.
//!
//! ## Architecture
//!
//! - [`result_set`] - The two read queries (mesh set, full citation set)
//! - [`csv_export`] - Delimited-file emission into the output directory
//! - [`warehouse`] - Upload client seam and the BigQuery REST implementation
//!
//! The mesh set and the full set target different tables, so a warehouse
//! batch uploads both concurrently; the staging store itself is only ever
//! read sequentially, before the uploads begin.

pub mod csv_export;
pub mod result_set;
pub mod warehouse;

#[cfg(test)]
pub mod tests;

// Re-export main types for easy access
pub use result_set::{citation_result_set, mesh_result_set};
pub use warehouse::{
    BigQueryClient, RecordingClient, ResultSetKind, UploadJob, WarehouseClient,
    resolve_upload_target,
};
