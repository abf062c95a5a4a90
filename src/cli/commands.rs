//! Command implementations for the MEDLINE processor CLI
//!
//! This module owns the run workflow around the core pipeline: logging
//! setup, configuration loading, directory bootstrap, batch selection, the
//! execution-history ledger, and archiving of processed source files.

use crate::app::models::BatchSummary;
use crate::app::services::export::warehouse::{BigQueryClient, WarehouseClient};
use crate::app::services::orchestrator::BatchOrchestrator;
use crate::cli::args::{Args, BatchSelection, Commands, ProcessArgs};
use crate::config::{Config, Destination, StagingMode};
use crate::constants::{
    ARCHIVE_DIR_NAME, EXECUTION_HISTORY_FIELDS, EXECUTION_HISTORY_FILE, SOURCE_SUFFIX,
};
use crate::{Error, Result};
use indicatif::HumanDuration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Main command runner
pub async fn run(args: Args) -> Result<Vec<BatchSummary>> {
    match args.command {
        Some(Commands::Process(process_args)) => run_process(process_args).await,
        None => Err(Error::configuration("no command provided")),
    }
}

/// Run the process command: select batches, process them, persist the
/// ledger, and archive the sources of successful batches
async fn run_process(args: ProcessArgs) -> Result<Vec<BatchSummary>> {
    let start_time = Instant::now();

    let config = load_configuration(&args)?;
    setup_logging(&args, &config)?;

    info!("Starting MEDLINE processor");
    debug!("Effective configuration: {:?}", config);

    config.validate()?;
    prepare_directories(&config)?;
    ensure_execution_history()?;

    let batches = select_batches(&config, &args.selection)?;
    info!("Selected {} batches from {}", batches.len(), config.processing.source_dir.display());

    let warehouse: Option<Arc<dyn WarehouseClient>> = match config.processing.destination {
        Destination::Warehouse => Some(Arc::new(BigQueryClient::from_config(&config.warehouse))),
        Destination::Csv => None,
    };

    println!("{}", BatchSummary::table_header());

    let config = Arc::new(config);
    let orchestrator = BatchOrchestrator::new(config.clone(), warehouse);
    let summaries = orchestrator.run(batches).await;

    archive_processed(&config, &summaries);
    append_execution_history(&summaries)?;
    cleanup_scratch(&config);

    let failed = summaries.iter().filter(|s| !s.succeeded).count();
    println!(
        "\nProcessed {} batches ({} failed) in {}",
        summaries.len(),
        failed,
        HumanDuration(start_time.elapsed())
    );

    Ok(summaries)
}

/// Load configuration from the config file and apply CLI overrides
fn load_configuration(args: &ProcessArgs) -> Result<Config> {
    let mut config = if args.config_file.exists() {
        Config::load(&args.config_file)?
    } else {
        Config::default()
    };

    if let Some(source_dir) = &args.source_dir {
        config.processing.source_dir = source_dir.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.processing.output_dir = output_dir.clone();
    }
    if let Some(workers) = args.workers {
        config.processing.max_concurrent_batches = workers;
    }
    config.logging.level = args.get_log_level().to_string();

    Ok(config)
}

/// Set up structured logging: a stderr layer plus an append-mode file layer
/// so every exception survives for postmortem review
fn setup_logging(args: &ProcessArgs, config: &Config) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("medline_processor={}", config.logging.level)));

    let log_file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&config.logging.file)
        .map_err(|e| {
            Error::io(
                format!("failed to open log file '{}'", config.logging.file.display()),
                e,
            )
        })?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(log_file));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}

/// Create the output directory and, in file staging mode, a fresh scratch
/// directory for the per-batch staging databases
fn prepare_directories(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.processing.output_dir).map_err(|e| {
        Error::io(
            format!(
                "failed to create output directory '{}'",
                config.processing.output_dir.display()
            ),
            e,
        )
    })?;

    if config.staging.mode == StagingMode::File {
        let scratch = &config.staging.scratch_dir;
        match std::fs::remove_dir_all(scratch) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::io(
                    format!("failed to clear scratch directory '{}'", scratch.display()),
                    e,
                ));
            }
        }
        std::fs::create_dir_all(scratch).map_err(|e| {
            Error::io(
                format!("failed to create scratch directory '{}'", scratch.display()),
                e,
            )
        })?;
    }

    Ok(())
}

/// Remove the scratch directory at the end of a file-staging run
fn cleanup_scratch(config: &Config) {
    if config.staging.mode == StagingMode::File {
        if let Err(e) = std::fs::remove_dir_all(&config.staging.scratch_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch directory: {}", e);
            }
        }
    }
}

/// Discover the `.xml` batch files directly inside the source directory
fn discover_batches(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut batches = Vec::new();

    for entry in WalkDir::new(source_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            Error::configuration(format!(
                "failed to scan source directory '{}': {}",
                source_dir.display(),
                e
            ))
        })?;

        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(SOURCE_SUFFIX)
        {
            batches.push(entry.into_path());
        }
    }

    batches.sort();
    Ok(batches)
}

/// Resolve the CLI selection against the available batch files
fn select_batches(config: &Config, selection: &BatchSelection) -> Result<Vec<PathBuf>> {
    let available = discover_batches(&config.processing.source_dir)?;

    match selection {
        BatchSelection::Named(name) => {
            let found = available
                .iter()
                .find(|path| path.file_name().is_some_and(|f| f.to_string_lossy() == *name));
            match found {
                Some(path) => Ok(vec![path.clone()]),
                None => Err(Error::configuration(format!(
                    "batch file '{}' does not exist in '{}'",
                    name,
                    config.processing.source_dir.display()
                ))),
            }
        }
        BatchSelection::Count(count) => {
            if *count > available.len() {
                warn!(
                    "Requested {} batches but only {} are available; processing all",
                    count,
                    available.len()
                );
            }
            Ok(available.into_iter().take(*count).collect())
        }
        BatchSelection::All => Ok(available),
    }
}

/// Create the execution-history ledger with its header row if absent
fn ensure_execution_history() -> Result<()> {
    if Path::new(EXECUTION_HISTORY_FILE).exists() {
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(EXECUTION_HISTORY_FILE).map_err(|e| {
        Error::CsvExport {
            path: EXECUTION_HISTORY_FILE.to_string(),
            source: e,
        }
    })?;
    writer.write_record(EXECUTION_HISTORY_FIELDS).map_err(|e| Error::CsvExport {
        path: EXECUTION_HISTORY_FILE.to_string(),
        source: e,
    })?;
    writer.flush().map_err(|e| {
        Error::io("failed to flush execution history header".to_string(), e)
    })?;

    Ok(())
}

/// Append one ledger row per batch to the execution history
fn append_execution_history(summaries: &[BatchSummary]) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(EXECUTION_HISTORY_FILE)
        .map_err(|e| Error::io("failed to open execution history".to_string(), e))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    for summary in summaries {
        writer
            .write_record(summary.ledger_record())
            .map_err(|e| Error::CsvExport {
                path: EXECUTION_HISTORY_FILE.to_string(),
                source: e,
            })?;
    }
    writer
        .flush()
        .map_err(|e| Error::io("failed to flush execution history".to_string(), e))?;

    Ok(())
}

/// Move each successful batch's source file into the archive subdirectory.
/// Failed batches stay in place so a later run can retry them.
fn archive_processed(config: &Config, summaries: &[BatchSummary]) {
    let archive_dir = config.processing.source_dir.join(ARCHIVE_DIR_NAME);
    if let Err(e) = std::fs::create_dir_all(&archive_dir) {
        warn!("Failed to create archive directory: {}", e);
        return;
    }

    for summary in summaries.iter().filter(|s| s.succeeded) {
        let source = config.processing.source_dir.join(&summary.source_file);
        let target = archive_dir.join(&summary.source_file);
        match std::fs::rename(&source, &target) {
            Ok(()) => debug!("Archived {}", summary.source_file),
            Err(e) => warn!("Failed to archive '{}': {}", summary.source_file, e),
        }
    }
}
