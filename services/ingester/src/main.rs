//! Observation ingester.
//!
//! Scans a directory tree of dataset folders, extracts observations from
//! tabular and array files, and loads them into PostgreSQL. Reports are
//! printed to stdout as JSON; logs go to stderr.

mod config_loader;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config_loader::{load_service_config, ServiceConfig};
use ingestion::{discover_datasets, suggest, DiagnosticScanner, Ingester};
use storage::{Catalog, MappingStore};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Observation file ingester")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "INGESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every dataset under ROOT without extracting or writing anything
    Scan {
        root: PathBuf,

        /// Case-insensitive partial dataset name
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Ingest every dataset under ROOT
    Ingest {
        root: PathBuf,

        #[arg(short, long)]
        filter: Option<String>,

        /// Extract and standardize without writing
        #[arg(long)]
        dry_run: bool,

        /// Delete each dataset's measurements before loading it
        #[arg(long)]
        reload: bool,

        /// Per-file cap on extracted rows
        #[arg(long)]
        row_limit: Option<usize>,

        /// Datasets processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Load the configured mapping seeds into the database
    Seed,

    /// Rank stored mappings against a raw parameter name
    Suggest {
        raw_name: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_service_config(path)?,
        None => ServiceConfig::default(),
    };

    init_tracing(
        args.log_level.as_deref().unwrap_or(&config.logging.level),
        args.json_logs || config.logging.json,
    )?;

    let writes = writes_to_store(&args.command, &config);

    match args.command {
        Command::Scan { root, filter } => {
            let filter = filter.or_else(|| config.ingestion.dataset_filter.clone());
            let datasets = discover_datasets(&root, filter.as_deref())?;
            let scanner = DiagnosticScanner::from_config(&config.ingestion)?;
            let report = scanner.scan(&datasets);
            info!(
                datasets = report.total_datasets,
                files = report.total_files,
                "Scan complete"
            );
            print_json(&report)
        }
        Command::Ingest {
            root,
            filter,
            dry_run,
            reload,
            row_limit,
            concurrency,
        } => {
            let mut ingest = config.ingestion.clone();
            ingest.dry_run |= dry_run;
            ingest.reload |= reload;
            if filter.is_some() {
                ingest.dataset_filter = filter;
            }
            if row_limit.is_some() {
                ingest.row_limit = row_limit;
            }
            if let Some(n) = concurrency {
                ingest.max_concurrent_datasets = n;
            }

            let catalog = connect(&config).await?;
            if writes {
                catalog.migrate().await?;
                seed_mappings(&catalog, &config).await?;
            }

            let ingester = Ingester::new(ingest, catalog.clone(), catalog.clone(), catalog)?;

            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current file");
                    let _ = tx.send(true);
                }
            });

            let summary = ingester.run(&root, rx).await?;
            info!(
                datasets = summary.datasets.len(),
                inserted = summary.totals.inserted,
                duplicates = summary.totals.duplicates,
                failed = summary.totals.failed,
                cancelled = summary.cancelled,
                "Ingestion finished"
            );
            print_json(&summary)
        }
        Command::Seed => {
            let catalog = connect(&config).await?;
            catalog.migrate().await?;
            let created = seed_mappings(&catalog, &config).await?;
            print_json(&serde_json::json!({ "created": created }))
        }
        Command::Suggest { raw_name, limit } => {
            let catalog = connect(&config).await?;
            let mappings = catalog.all().await?;
            let mut suggestions = suggest(&raw_name, &mappings);
            suggestions.truncate(limit);
            print_json(&suggestions)
        }
    }
}

/// Whether a command may create the schema or write rows. Dry runs,
/// scans and suggestions only read.
fn writes_to_store(command: &Command, config: &ServiceConfig) -> bool {
    match command {
        Command::Ingest { dry_run, .. } => !(*dry_run || config.ingestion.dry_run),
        Command::Seed => true,
        Command::Scan { .. } | Command::Suggest { .. } => false,
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.with_thread_ids(true).json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Open the pool without touching the schema; writers migrate explicitly.
async fn connect(config: &ServiceConfig) -> Result<Arc<Catalog>> {
    let db = &config.database;
    let catalog = Catalog::connect(
        &db.url,
        db.max_connections,
        Duration::from_secs(db.connect_timeout_secs),
    )
    .await
    .context("Failed to connect to the database")?;
    Ok(Arc::new(catalog))
}

async fn seed_mappings(catalog: &Catalog, config: &ServiceConfig) -> Result<usize> {
    let seeds = config.seed_mappings()?;
    if seeds.is_empty() {
        return Ok(0);
    }
    let created = catalog.seed(&seeds).await?;
    info!(seeds = seeds.len(), created, "Loaded mapping seeds");
    Ok(created)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
