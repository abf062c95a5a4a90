//! Data models for MEDLINE citation processing
//!
//! This module contains the staged relation rows produced by the record
//! normalizer, the denormalized export rows read back by the sink, and the
//! per-batch result summary consumed by the run ledger.

use crate::config::{Destination, StagingMode};
use crate::constants::{MESH_SUFFIX, RUN_DATE_FORMAT};
use chrono::Local;
use serde::{Deserialize, Serialize};

// =============================================================================
// Staged Relation Rows
// =============================================================================

/// One article row per citation identifier (primary key = pmid)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRow {
    /// PubMed identifier, unique within a batch's staging instance
    pub pmid: i64,

    /// Article title with bracket markers normalized away
    pub article_title: Option<String>,

    /// Completion date as `"D/M/Y"`, when present
    pub date_created: Option<String>,

    /// Revision date as `"D/M/Y"`, when present
    pub date_revised: Option<String>,

    /// Journal ISSN and its declared type
    pub issn: Option<String>,
    pub issn_type: Option<String>,

    /// Print/electronic medium of the cited journal issue
    pub cited_medium: Option<String>,

    pub volume: Option<String>,
    pub issue: Option<String>,

    /// Publication year and month resolved from structured or free-text dates
    pub pub_year: Option<String>,
    pub pub_month: Option<String>,

    pub journal_title: Option<String>,
    pub journal_abbreviation: Option<String>,

    /// NLM journal registry identifier
    pub journal_nlm_id: Option<String>,
}

/// One subject-heading row, unique per (pmid, descriptor_code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshHeadingRow {
    pub pmid: i64,
    pub descriptor_code: Option<String>,
    /// Whether the heading is a primary topic of the citation
    pub major_topic: bool,
}

/// One publication-type row, unique per (pmid, ordinal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationTypeRow {
    pub pmid: i64,
    pub type_name: Option<String>,
    pub type_code: Option<String>,
    /// 1-based position within the record, in source order
    pub ordinal: i64,
}

/// One author/affiliation row, unique per (pmid, author_ordinal, affiliation_ordinal).
///
/// An author without affiliations gets exactly one row with
/// `affiliation_ordinal` 0 and a null affiliation; an author with N
/// affiliations gets rows with ordinals 1..=N.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorAffiliationRow {
    pub pmid: i64,
    /// 1-based author position within the record
    pub author_ordinal: i64,
    pub initials: Option<String>,
    pub fore_name: Option<String>,
    pub last_name: Option<String>,
    /// 0 for the no-affiliation placeholder, otherwise 1-based
    pub affiliation_ordinal: i64,
    pub affiliation: Option<String>,
}

// =============================================================================
// Export Result Sets
// =============================================================================

/// Row of the mesh result set, tagged with the batch source and a 1-based
/// row number. Field order is the delimited-file column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshExportRow {
    pub row_id: i64,
    pub source: String,
    pub pmid: i64,
    pub descriptor_code: Option<String>,
    pub major_topic: bool,
}

/// Row of the full citation result set: articles left-joined with
/// author/affiliation and publication-type rows on pmid. Join-side fields
/// are null when an article has no matching rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationExportRow {
    pub row_id: i64,
    pub source: String,
    pub pmid: i64,
    pub article_title: Option<String>,
    pub date_created: Option<String>,
    pub affiliation: Option<String>,
    pub affiliation_ordinal: Option<i64>,
    pub author_ordinal: Option<i64>,
    pub initials: Option<String>,
    pub fore_name: Option<String>,
    pub last_name: Option<String>,
    pub date_revised: Option<String>,
    pub issn: Option<String>,
    pub issn_type: Option<String>,
    pub cited_medium: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pub_year: Option<String>,
    pub pub_month: Option<String>,
    pub journal_title: Option<String>,
    pub journal_abbreviation: Option<String>,
    pub journal_nlm_id: Option<String>,
    pub publication_type: Option<String>,
    pub publication_type_code: Option<String>,
    pub publication_type_ordinal: Option<i64>,
}

// =============================================================================
// Batch Result Summary
// =============================================================================

/// Result of processing one batch, consumed by the run ledger and the
/// per-batch progress table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Source file name of the batch
    pub source_file: String,

    /// Where the result sets were delivered
    pub destination: Destination,

    /// How the staging store was backed
    pub staging_mode: StagingMode,

    /// Derived output name pair, `"<stem>_mesh <stem>"`
    pub output_name: String,

    /// Wall-clock seconds for the whole batch
    pub elapsed_secs: f64,

    /// Seconds spent uploading (the slower of the two uploads); 0 for the
    /// file destination and for failed batches
    pub upload_secs: f64,

    /// Local timestamp at which the batch completed
    pub run_date: String,

    /// Whether the batch ran to completion; failed batches are not archived
    pub succeeded: bool,
}

impl BatchSummary {
    /// Build a summary for a batch that ran to completion
    pub fn completed(
        source_file: &str,
        stem: &str,
        destination: Destination,
        staging_mode: StagingMode,
        elapsed_secs: f64,
        upload_secs: f64,
    ) -> Self {
        Self {
            source_file: source_file.to_string(),
            destination,
            staging_mode,
            output_name: format!("{stem}{MESH_SUFFIX} {stem}"),
            elapsed_secs,
            upload_secs,
            run_date: Local::now().format(RUN_DATE_FORMAT).to_string(),
            succeeded: true,
        }
    }

    /// Build the zero-duration summary for a failed batch
    pub fn failed(
        source_file: &str,
        stem: &str,
        destination: Destination,
        staging_mode: StagingMode,
    ) -> Self {
        Self {
            elapsed_secs: 0.0,
            upload_secs: 0.0,
            succeeded: false,
            ..Self::completed(source_file, stem, destination, staging_mode, 0.0, 0.0)
        }
    }

    /// Ledger record in execution-history column order
    pub fn ledger_record(&self) -> [String; 7] {
        [
            self.source_file.clone(),
            self.destination.to_string(),
            self.staging_mode.to_string(),
            self.output_name.clone(),
            format!("{:.2}", self.elapsed_secs),
            format!("{:.2}", self.upload_secs),
            self.run_date.clone(),
        ]
    }

    /// Header for the per-batch progress table
    pub fn table_header() -> String {
        format!(
            "{:<24} {:<10} {:<8} {:<34} {:>10} {:>12}  {}",
            "source_file", "dest", "staging", "output_name", "time_secs", "upload_secs", "run_date"
        )
    }

    /// One aligned progress-table line for this batch
    pub fn table_row(&self) -> String {
        let marker = if self.succeeded { " " } else { "!" };
        format!(
            "{marker}{:<23} {:<10} {:<8} {:<34} {:>10.2} {:>12.2}  {}",
            truncate(&self.source_file, 23),
            self.destination,
            self.staging_mode,
            truncate(&self.output_name, 34),
            self.elapsed_secs,
            self.upload_secs,
            self.run_date
        )
    }
}

/// Truncate a display value to fit its table column
fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
