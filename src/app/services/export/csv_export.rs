//! Delimited-file emission for the file destination
//!
//! Each batch produces two files in the output directory's CSV subfolder:
//! `<stem>.csv` for the full citation set and `<stem>_mesh.csv` for the
//! mesh set. The subfolder is created on demand.

use crate::app::models::{CitationExportRow, MeshExportRow};
use crate::constants::{CSV_SUBDIR, MESH_SUFFIX};
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write the mesh result set; returns the written file path
pub fn write_mesh_csv(rows: &[MeshExportRow], output_dir: &Path, stem: &str) -> Result<PathBuf> {
    write_rows(rows, output_dir, &format!("{stem}{MESH_SUFFIX}.csv"))
}

/// Write the full citation result set; returns the written file path
pub fn write_citation_csv(
    rows: &[CitationExportRow],
    output_dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    write_rows(rows, output_dir, &format!("{stem}.csv"))
}

fn write_rows<T: Serialize>(rows: &[T], output_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let csv_dir = output_dir.join(CSV_SUBDIR);
    std::fs::create_dir_all(&csv_dir).map_err(|e| {
        Error::io(
            format!("failed to create CSV directory '{}'", csv_dir.display()),
            e,
        )
    })?;

    let path = csv_dir.join(file_name);
    let mut writer = csv::Writer::from_path(&path).map_err(|e| Error::CsvExport {
        path: path.display().to_string(),
        source: e,
    })?;

    for row in rows {
        writer.serialize(row).map_err(|e| Error::CsvExport {
            path: path.display().to_string(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| {
        Error::io(format!("failed to flush CSV file '{}'", path.display()), e)
    })?;

    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(path)
}
