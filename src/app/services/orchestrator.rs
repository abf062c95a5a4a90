//! Batch orchestrator
//!
//! Runs the per-batch pipeline over every selected input batch. In memory
//! staging mode batches run strictly sequentially in the calling task; in
//! file staging mode each batch runs on its own worker task with its own
//! staging database, and admission is bounded by a semaphore sized to the
//! configured concurrency budget so the warehouse never sees an unbounded
//! burst of concurrent uploads. Results are collected in completion order.
//! Once dispatched, a batch runs to completion or failure; there is no
//! cancellation.

use crate::app::models::BatchSummary;
use crate::app::services::export::warehouse::WarehouseClient;
use crate::app::services::pipeline::BatchPipeline;
use crate::config::{Config, StagingMode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Orchestrates a run over many input batches
pub struct BatchOrchestrator {
    config: Arc<Config>,
    warehouse: Option<Arc<dyn WarehouseClient>>,
}

impl BatchOrchestrator {
    pub fn new(config: Arc<Config>, warehouse: Option<Arc<dyn WarehouseClient>>) -> Self {
        Self { config, warehouse }
    }

    /// Process the selected batches, printing one progress-table line per
    /// completed batch. A batch failure never affects its siblings.
    pub async fn run(&self, batches: Vec<PathBuf>) -> Vec<BatchSummary> {
        match self.config.staging.mode {
            StagingMode::Memory => self.run_sequential(batches).await,
            StagingMode::File => self.run_pooled(batches).await,
        }
    }

    async fn run_sequential(&self, batches: Vec<PathBuf>) -> Vec<BatchSummary> {
        info!("Processing {} batches sequentially (memory staging)", batches.len());

        let pipeline = BatchPipeline::new(self.config.clone(), self.warehouse.clone());
        let mut summaries = Vec::with_capacity(batches.len());

        for batch in batches {
            let summary = pipeline.process(&batch).await;
            println!("{}", summary.table_row());
            summaries.push(summary);
        }

        summaries
    }

    async fn run_pooled(&self, batches: Vec<PathBuf>) -> Vec<BatchSummary> {
        let budget = self.config.concurrency_budget();
        info!(
            "Processing {} batches with up to {} workers (file staging)",
            batches.len(),
            budget
        );

        let semaphore = Arc::new(Semaphore::new(budget));
        let mut workers: JoinSet<BatchSummary> = JoinSet::new();

        for batch in batches {
            let semaphore = semaphore.clone();
            let pipeline = BatchPipeline::new(self.config.clone(), self.warehouse.clone());
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("orchestrator semaphore closed");
                pipeline.process(&batch).await
            });
        }

        // Completion order, not submission order
        let mut summaries = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(summary) => {
                    println!("{}", summary.table_row());
                    summaries.push(summary);
                }
                Err(e) => error!("Batch worker did not complete: {}", e),
            }
        }

        summaries
    }
}
