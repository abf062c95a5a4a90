//! Per-batch processing pipeline
//!
//! Wires the parser, normalizer, staging store, and sink together for one
//! input batch. The pipeline is a small state machine: `Opened` (store
//! created, schema defined) -> `Normalized` (all records processed) ->
//! `Exported` (both result sets delivered) -> `Closed`, with `Failed`
//! reachable from any state. The store is closed unconditionally, and a
//! failed batch reports a zero-duration summary so its source file stays in
//! place for a later retry.
//!
//! The synchronous stretch (read, parse, stage, materialize, CSV write)
//! runs on a blocking task; for the warehouse destination the two
//! materialized result sets then upload on concurrent tasks and the slower
//! upload bounds the batch's completion.

use crate::app::models::BatchSummary;
use crate::app::services::citation_parser::{citation_records, parse_document};
use crate::app::services::export::csv_export::{write_citation_csv, write_mesh_csv};
use crate::app::services::export::warehouse::{
    ResultSetKind, UploadJob, WarehouseClient, resolve_upload_target,
};
use crate::app::services::export::{citation_result_set, mesh_result_set};
use crate::app::services::normalizer::normalize_batch;
use crate::app::services::staging::StagingStore;
use crate::config::{Config, Destination};
use crate::constants::{MESH_SUFFIX, SOURCE_SUFFIX};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// States of the per-batch pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Opened,
    Normalized,
    Exported,
    Closed,
    Failed,
}

/// What the staging stretch hands to the export step
enum ExportPayload {
    /// Both files were already written sequentially
    Files { mesh: PathBuf, citations: PathBuf },
    /// Materialized result sets awaiting concurrent upload
    Warehouse {
        mesh: Box<UploadJob>,
        citations: Box<UploadJob>,
    },
}

/// Derive the batch stem by exact suffix removal
pub fn batch_stem(file_name: &str) -> &str {
    file_name.strip_suffix(SOURCE_SUFFIX).unwrap_or(file_name)
}

/// Pipeline for processing one batch end to end
pub struct BatchPipeline {
    config: Arc<Config>,
    warehouse: Option<Arc<dyn WarehouseClient>>,
}

impl BatchPipeline {
    /// Create a pipeline; the warehouse client is only needed for the
    /// warehouse destination
    pub fn new(config: Arc<Config>, warehouse: Option<Arc<dyn WarehouseClient>>) -> Self {
        Self { config, warehouse }
    }

    /// Process one batch file to completion.
    ///
    /// Never propagates the batch's failure: any error is logged, the store
    /// is closed, and a failure-flagged summary is returned so sibling
    /// batches keep running.
    pub async fn process(&self, source: &Path) -> BatchSummary {
        let started = Instant::now();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let stem = batch_stem(&file_name).to_string();

        match self.drive(source, &file_name, &stem).await {
            Ok(upload_duration) => BatchSummary::completed(
                &file_name,
                &stem,
                self.config.processing.destination,
                self.config.staging.mode,
                started.elapsed().as_secs_f64(),
                upload_duration.as_secs_f64(),
            ),
            Err(e) => {
                error!("Batch '{}' failed: {}", file_name, e);
                debug!("Batch '{}' pipeline state: {:?}", file_name, PipelineState::Failed);
                BatchSummary::failed(
                    &file_name,
                    &stem,
                    self.config.processing.destination,
                    self.config.staging.mode,
                )
            }
        }
    }

    async fn drive(&self, source: &Path, file_name: &str, stem: &str) -> Result<Duration> {
        let config = self.config.clone();
        let source = source.to_path_buf();
        let task_file_name = file_name.to_string();
        let task_stem = stem.to_string();

        let payload =
            tokio::task::spawn_blocking(move || stage_batch(&config, &source, &task_file_name, &task_stem))
                .await
                .map_err(|e| Error::worker(format!("staging task did not complete: {e}")))??;

        match payload {
            ExportPayload::Files { mesh, citations } => {
                info!(
                    "Batch '{}' exported to {} and {}",
                    file_name,
                    citations.display(),
                    mesh.display()
                );
                Ok(Duration::ZERO)
            }
            ExportPayload::Warehouse { mesh, citations } => {
                let client = self.warehouse.clone().ok_or_else(|| {
                    Error::configuration("warehouse destination requires a warehouse client")
                })?;

                // The two result sets target different tables, so they race
                // on independent tasks; ordering between them is immaterial
                let mesh_client = client.clone();
                let mesh_task = tokio::spawn(async move { mesh_client.upload(*mesh).await });
                let citation_task = tokio::spawn(async move { client.upload(*citations).await });

                let (mesh_outcome, citation_outcome) = tokio::join!(mesh_task, citation_task);
                let mesh_duration = mesh_outcome
                    .map_err(|e| Error::worker(format!("mesh upload task failed: {e}")))??;
                let citation_duration = citation_outcome
                    .map_err(|e| Error::worker(format!("citation upload task failed: {e}")))??;

                debug!("Batch '{}' pipeline state: {:?}", file_name, PipelineState::Exported);

                // The slower upload bounds the batch's completion
                Ok(mesh_duration.max(citation_duration))
            }
        }
    }
}

/// Synchronous staging stretch: read, parse, stage, materialize, and for
/// the file destination write both CSVs sequentially. The store never
/// survives this function, success or failure.
fn stage_batch(
    config: &Config,
    source: &Path,
    file_name: &str,
    stem: &str,
) -> Result<ExportPayload> {
    let xml = std::fs::read_to_string(source).map_err(|e| {
        Error::io(format!("failed to read batch file '{}'", source.display()), e)
    })?;
    let document = parse_document(&xml, file_name)?;
    let records = citation_records(&document, file_name)?;

    let mut store = StagingStore::open(config.staging.mode, stem, &config.staging.scratch_dir)?;
    let outcome = run_staged_states(config, &mut store, &records, file_name, stem);

    // Closed unconditionally, even when an earlier state failed
    store.close();
    debug!("Batch '{}' pipeline state: {:?}", file_name, PipelineState::Closed);

    outcome
}

fn run_staged_states(
    config: &Config,
    store: &mut StagingStore,
    records: &[&serde_json::Value],
    file_name: &str,
    stem: &str,
) -> Result<ExportPayload> {
    store.define_schema()?;
    debug!("Batch '{}' pipeline state: {:?}", file_name, PipelineState::Opened);

    let stats = normalize_batch(store, records)?;
    debug!(
        "Batch '{}' pipeline state: {:?} ({}/{} records)",
        file_name,
        PipelineState::Normalized,
        stats.records_normalized,
        stats.records_seen
    );

    let conn = store.connection()?;
    let mesh_rows = mesh_result_set(conn, file_name)?;
    let citation_rows = citation_result_set(conn, file_name)?;

    match config.processing.destination {
        Destination::Csv => {
            let output_dir = &config.processing.output_dir;
            let citations = write_citation_csv(&citation_rows, output_dir, stem)?;
            let mesh = write_mesh_csv(&mesh_rows, output_dir, stem)?;
            debug!("Batch '{}' pipeline state: {:?}", file_name, PipelineState::Exported);
            Ok(ExportPayload::Files { mesh, citations })
        }
        Destination::Warehouse => {
            let (mesh_table, mesh_mode) =
                resolve_upload_target(stem, MESH_SUFFIX, &config.warehouse);
            let (citation_table, citation_mode) =
                resolve_upload_target(stem, "", &config.warehouse);

            Ok(ExportPayload::Warehouse {
                mesh: Box::new(UploadJob::new(
                    mesh_table,
                    mesh_mode,
                    ResultSetKind::Mesh,
                    &mesh_rows,
                )?),
                citations: Box::new(UploadJob::new(
                    citation_table,
                    citation_mode,
                    ResultSetKind::Citation,
                    &citation_rows,
                )?),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::export::warehouse::RecordingClient;
    use crate::config::{StagingMode, WriteMode};
    use tempfile::TempDir;

    const SAMPLE_BATCH: &str = r#"<PubmedArticleSet>
      <PubmedArticle>
        <MedlineCitation>
          <PMID>11111</PMID>
          <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
          <Article>
            <Journal><JournalIssue><Volume>1</Volume></JournalIssue><Title>J</Title></Journal>
            <ArticleTitle>First</ArticleTitle>
            <PublicationTypeList>
              <PublicationType UI="D016428">Journal Article</PublicationType>
            </PublicationTypeList>
          </Article>
          <MeshHeadingList>
            <MeshHeading><DescriptorName UI="D01" MajorTopicYN="Y">A</DescriptorName></MeshHeading>
          </MeshHeadingList>
        </MedlineCitation>
      </PubmedArticle>
    </PubmedArticleSet>"#;

    fn test_config(temp: &TempDir, destination: Destination) -> Arc<Config> {
        let mut config = Config::new(temp.path().join("input"), temp.path().join("output"));
        config.processing.destination = destination;
        config.staging.scratch_dir = temp.path().join("scratch");
        config.warehouse.project = "proj".to_string();
        config.warehouse.dataset = "citations".to_string();
        std::fs::create_dir_all(&config.processing.source_dir).unwrap();
        Arc::new(config)
    }

    fn write_batch(config: &Config, name: &str, xml: &str) -> PathBuf {
        let path = config.processing.source_dir.join(name);
        std::fs::write(&path, xml).unwrap();
        path
    }

    #[test]
    fn test_batch_stem_exact_suffix_removal() {
        assert_eq!(batch_stem("pubmed24n0012.xml"), "pubmed24n0012");
        // Stems ending in suffix characters are not over-trimmed
        assert_eq!(batch_stem("batch_xml.xml"), "batch_xml");
        assert_eq!(batch_stem("no_suffix.txt"), "no_suffix.txt");
    }

    #[tokio::test]
    async fn test_csv_batch_completes_and_writes_both_files() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, Destination::Csv);
        let source = write_batch(&config, "batch_one.xml", SAMPLE_BATCH);

        let pipeline = BatchPipeline::new(config.clone(), None);
        let summary = pipeline.process(&source).await;

        assert!(summary.succeeded);
        assert_eq!(summary.upload_secs, 0.0);
        assert_eq!(summary.source_file, "batch_one.xml");
        assert!(config.processing.output_dir.join("CSV/batch_one.csv").exists());
        assert!(config.processing.output_dir.join("CSV/batch_one_mesh.csv").exists());
    }

    #[tokio::test]
    async fn test_unreadable_batch_reports_failure() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, Destination::Csv);

        let pipeline = BatchPipeline::new(config.clone(), None);
        let summary = pipeline
            .process(&config.processing.source_dir.join("missing.xml"))
            .await;

        assert!(!summary.succeeded);
        assert_eq!(summary.elapsed_secs, 0.0);
        assert_eq!(summary.upload_secs, 0.0);
    }

    #[tokio::test]
    async fn test_warehouse_batch_uploads_both_tables() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, Destination::Warehouse);
        let source = write_batch(&config, "batch_two.xml", SAMPLE_BATCH);

        let client = Arc::new(RecordingClient::new());
        let pipeline = BatchPipeline::new(config, Some(client.clone()));
        let summary = pipeline.process(&source).await;

        assert!(summary.succeeded);
        let mut tables: Vec<String> = client.uploads().iter().map(|u| u.table.clone()).collect();
        tables.sort();
        assert_eq!(tables, vec!["batch_two".to_string(), "batch_two_mesh".to_string()]);
    }

    #[tokio::test]
    async fn test_fixed_table_upload_is_always_append() {
        let temp = TempDir::new().unwrap();
        let config = {
            let mut config = (*test_config(&temp, Destination::Warehouse)).clone();
            config.warehouse.write_mode = WriteMode::Replace;
            config.warehouse.fixed_table = Some("all_citations".to_string());
            Arc::new(config)
        };
        let source = write_batch(&config, "batch_three.xml", SAMPLE_BATCH);

        let client = Arc::new(RecordingClient::new());
        let pipeline = BatchPipeline::new(config, Some(client.clone()));
        let summary = pipeline.process(&source).await;

        assert!(summary.succeeded);
        let uploads = client.uploads();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().all(|u| u.write_mode == WriteMode::Append));
        assert!(uploads.iter().any(|u| u.table == "all_citations"));
        assert!(uploads.iter().any(|u| u.table == "all_citations_mesh"));
    }

    #[tokio::test]
    async fn test_upload_failure_marks_batch_failed() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, Destination::Warehouse);
        let source = write_batch(&config, "batch_four.xml", SAMPLE_BATCH);

        let client = Arc::new(RecordingClient::failing_on("batch_four"));
        let pipeline = BatchPipeline::new(config, Some(client));
        let summary = pipeline.process(&source).await;

        assert!(!summary.succeeded);
        assert_eq!(summary.upload_secs, 0.0);
    }

    #[tokio::test]
    async fn test_file_staging_mode_uses_scratch_database() {
        let temp = TempDir::new().unwrap();
        let config = {
            let mut config = (*test_config(&temp, Destination::Csv)).clone();
            config.staging.mode = StagingMode::File;
            Arc::new(config)
        };
        let source = write_batch(&config, "batch_five.xml", SAMPLE_BATCH);

        let pipeline = BatchPipeline::new(config.clone(), None);
        let summary = pipeline.process(&source).await;

        assert!(summary.succeeded);
        assert!(config.staging.scratch_dir.join("batch_five.db").exists());
    }
}
