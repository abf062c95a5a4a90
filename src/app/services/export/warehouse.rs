//! Warehouse upload client
//!
//! The sink talks to the warehouse through the [`WarehouseClient`] seam so
//! the pipeline can race two uploads without knowing the transport. The
//! production implementation drives the BigQuery REST API over HTTP;
//! credentials are provisioned externally and used as-is.

use crate::config::{WarehouseConfig, WriteMode};
use crate::constants::{BIGQUERY_API_BASE, INSERT_CHUNK_ROWS};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which result set a table carries; decides its schema when the table has
/// to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSetKind {
    Mesh,
    Citation,
}

impl ResultSetKind {
    /// Warehouse column definitions for this result set
    fn schema_fields(&self) -> Value {
        fn field(name: &str, kind: &str) -> Value {
            json!({"name": name, "type": kind, "mode": "NULLABLE"})
        }

        match self {
            ResultSetKind::Mesh => json!([
                field("row_id", "INTEGER"),
                field("source", "STRING"),
                field("pmid", "INTEGER"),
                field("descriptor_code", "STRING"),
                field("major_topic", "BOOLEAN"),
            ]),
            ResultSetKind::Citation => json!([
                field("row_id", "INTEGER"),
                field("source", "STRING"),
                field("pmid", "INTEGER"),
                field("article_title", "STRING"),
                field("date_created", "STRING"),
                field("affiliation", "STRING"),
                field("affiliation_ordinal", "INTEGER"),
                field("author_ordinal", "INTEGER"),
                field("initials", "STRING"),
                field("fore_name", "STRING"),
                field("last_name", "STRING"),
                field("date_revised", "STRING"),
                field("issn", "STRING"),
                field("issn_type", "STRING"),
                field("cited_medium", "STRING"),
                field("volume", "STRING"),
                field("issue", "STRING"),
                field("pub_year", "STRING"),
                field("pub_month", "STRING"),
                field("journal_title", "STRING"),
                field("journal_abbreviation", "STRING"),
                field("journal_nlm_id", "STRING"),
                field("publication_type", "STRING"),
                field("publication_type_code", "STRING"),
                field("publication_type_ordinal", "INTEGER"),
            ]),
        }
    }
}

/// One upload of a materialized result set into a warehouse table
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// Bare table name within the configured dataset
    pub table: String,
    pub write_mode: WriteMode,
    pub kind: ResultSetKind,
    pub rows: Vec<Value>,
}

impl UploadJob {
    /// Build an upload job from serializable export rows
    pub fn new<T: Serialize>(
        table: String,
        write_mode: WriteMode,
        kind: ResultSetKind,
        rows: &[T],
    ) -> Result<Self> {
        let rows = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::upload(&table, format!("failed to serialize rows: {e}")))?;

        Ok(Self {
            table,
            write_mode,
            kind,
            rows,
        })
    }
}

/// Resolve the destination table and effective write mode for one result set.
///
/// A configured fixed table collects every batch, so it is always appended
/// to; replacing it from concurrently running batches would destroy sibling
/// output. The result-set suffix applies to the fixed name as well.
pub fn resolve_upload_target(
    stem: &str,
    suffix: &str,
    config: &WarehouseConfig,
) -> (String, WriteMode) {
    let (base, write_mode) = match &config.fixed_table {
        Some(fixed) => (fixed.as_str(), WriteMode::Append),
        None => (stem, config.write_mode),
    };
    (format!("{base}{suffix}"), write_mode)
}

/// Transport seam for warehouse uploads
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Deliver one result set into its destination table, returning the
    /// elapsed upload duration
    async fn upload(&self, job: UploadJob) -> Result<Duration>;
}

/// BigQuery REST implementation of [`WarehouseClient`]
pub struct BigQueryClient {
    http: reqwest::Client,
    api_base: String,
    project: String,
    dataset: String,
    access_token: String,
}

impl BigQueryClient {
    /// Build a client from the warehouse configuration
    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| BIGQUERY_API_BASE.to_string()),
            project: config.project.clone(),
            dataset: config.dataset.clone(),
            access_token: config.access_token.clone(),
        }
    }

    fn tables_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables",
            self.api_base, self.project, self.dataset
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.tables_url(), table)
    }

    /// Drop the destination table, tolerating its absence
    async fn delete_table(&self, table: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.table_url(table))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Error::upload(
                table,
                format!("delete failed with status {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn create_table(&self, table: &str, kind: ResultSetKind) -> Result<()> {
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": self.dataset,
                "tableId": table,
            },
            "schema": { "fields": kind.schema_fields() },
        });

        let response = self
            .http
            .post(self.tables_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upload(
                table,
                format!("create failed with status {}", response.status()),
            ));
        }
        Ok(())
    }

    /// Create the destination table unless it already exists
    async fn ensure_table(&self, table: &str, kind: ResultSetKind) -> Result<()> {
        let response = self
            .http
            .get(self.table_url(table))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return self.create_table(table, kind).await;
        }
        if !response.status().is_success() {
            return Err(Error::upload(
                table,
                format!("lookup failed with status {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn insert_chunk(&self, table: &str, rows: &[Value]) -> Result<()> {
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": rows.iter().map(|row| json!({"json": row})).collect::<Vec<_>>(),
        });

        let response = self
            .http
            .post(format!("{}/insertAll", self.table_url(table)))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upload(
                table,
                format!("insert failed with status {}", response.status()),
            ));
        }

        let outcome: Value = response.json().await?;
        if let Some(errors) = outcome.get("insertErrors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(Error::upload(
                    table,
                    format!("{} rows were rejected by the warehouse", errors.len()),
                ));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn upload(&self, job: UploadJob) -> Result<Duration> {
        let start = Instant::now();

        match job.write_mode {
            WriteMode::Replace => {
                self.delete_table(&job.table).await?;
                self.create_table(&job.table, job.kind).await?;
            }
            WriteMode::Append => {
                self.ensure_table(&job.table, job.kind).await?;
            }
        }

        for chunk in job.rows.chunks(INSERT_CHUNK_ROWS) {
            self.insert_chunk(&job.table, chunk).await?;
            debug!("Inserted {} rows into {}", chunk.len(), job.table);
        }

        let elapsed = start.elapsed();
        info!(
            "Uploaded {} rows to {}.{} in {:.2}s",
            job.rows.len(),
            self.dataset,
            job.table,
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }
}

/// In-memory [`WarehouseClient`] that records every upload it receives.
///
/// Used by tests and dry runs to observe sink behavior without network
/// access. An optional per-table failure and artificial delay exercise the
/// pipeline's error and timing paths.
#[derive(Debug, Default)]
pub struct RecordingClient {
    uploads: Mutex<Vec<RecordedUpload>>,
    fail_table: Option<String>,
    delay: Option<Duration>,
}

/// One upload observed by a [`RecordingClient`]
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub table: String,
    pub write_mode: WriteMode,
    pub row_count: usize,
    pub rows: Vec<Value>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any upload that targets the given table
    pub fn failing_on(table: impl Into<String>) -> Self {
        Self {
            fail_table: Some(table.into()),
            ..Self::default()
        }
    }

    /// Sleep for the given duration before acknowledging each upload
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Snapshot of the uploads received so far
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().expect("recording lock poisoned").clone()
    }
}

#[async_trait]
impl WarehouseClient for RecordingClient {
    async fn upload(&self, job: UploadJob) -> Result<Duration> {
        let start = Instant::now();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fail_table) = &self.fail_table {
            if &job.table == fail_table {
                return Err(Error::upload(&job.table, "simulated upload failure"));
            }
        }

        self.uploads
            .lock()
            .expect("recording lock poisoned")
            .push(RecordedUpload {
                table: job.table,
                write_mode: job.write_mode,
                row_count: job.rows.len(),
                rows: job.rows,
            });

        Ok(start.elapsed())
    }
}
