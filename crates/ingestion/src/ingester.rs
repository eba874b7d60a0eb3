//! Ingestion pipeline: discovery → extraction → quality filter →
//! standardization → batch loading.
//!
//! Datasets may run concurrently (`max_concurrent_datasets`); inside one
//! dataset, files are processed strictly in order and each file is loaded
//! before the next one is extracted. Extraction runs on the blocking pool
//! under the file timeout.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use obs_common::{CandidateRecord, Dataset, DatasetId, Mapping, QualityFlag, UNKNOWN_UNIT};
use storage::{DatasetRegistry, MappingStore, MeasurementSink, StoreError, StoreResult};

use crate::config::IngestConfig;
use crate::discovery::discover_datasets;
use crate::error::Result;
use crate::extract::{extractor_for, ExtractContext, ExtractionPath, Extractor, FileExtraction, Observation};
use crate::issue::FileIssue;
use crate::loader::BatchLoader;
use crate::quality::QualityFilter;
use crate::standardize::{ParameterStandardizer, Suggestion};
use crate::summary::{DatasetSummary, FileSummary, RunSummary};
use crate::time::TimeNormalizer;

/// Drives a full ingestion run.
pub struct Ingester {
    config: IngestConfig,
    registry: Arc<dyn DatasetRegistry>,
    standardizer: ParameterStandardizer,
    loader: BatchLoader,
    filter: QualityFilter,
    context: ExtractContext,
}

impl Ingester {
    /// Build an ingester. Fails on invalid configuration.
    pub fn new(
        config: IngestConfig,
        mappings: Arc<dyn MappingStore>,
        registry: Arc<dyn DatasetRegistry>,
        sink: Arc<dyn MeasurementSink>,
    ) -> Result<Self> {
        config.validate()?;

        let mut context = ExtractContext::new(TimeNormalizer::from_config(&config)?);
        context.fallback_encodings = config.encodings()?;
        context.row_limit = config.row_limit;

        let standardizer = if config.dry_run {
            ParameterStandardizer::read_only(mappings)
        } else {
            ParameterStandardizer::new(mappings)
        };

        Ok(Self {
            loader: BatchLoader::from_config(sink, &config),
            filter: QualityFilter::from_config(&config),
            registry,
            standardizer,
            context,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Discover datasets under `root` and ingest them.
    ///
    /// Setting `shutdown` to `true` stops every dataset after its current
    /// file. Only configuration, input-tree and fatal storage errors are
    /// returned as `Err`; everything else ends up in the summary.
    pub async fn run(&self, root: &Path, shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let datasets = discover_datasets(root, self.config.dataset_filter.as_deref())?;
        self.run_datasets(&datasets, shutdown).await
    }

    pub async fn run_datasets(
        &self,
        datasets: &[Dataset],
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        info!(
            datasets = datasets.len(),
            dry_run = self.config.dry_run,
            concurrency = self.config.max_concurrent_datasets,
            "Starting ingestion run"
        );

        let mut summary = RunSummary {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let mut results = stream::iter(datasets.iter().map(|dataset| {
            let shutdown = shutdown.clone();
            async move { self.ingest_dataset(dataset, &shutdown).await }
        }))
        .buffered(self.config.max_concurrent_datasets);

        while let Some(result) = results.next().await {
            summary.push(result?);
        }
        summary.mappings_created = self.standardizer.created_count();

        let t = &summary.totals;
        info!(
            datasets = summary.datasets.len(),
            files = t.files,
            files_failed = t.files_failed,
            kept = t.kept,
            dropped = t.dropped,
            inserted = t.inserted,
            duplicates = t.duplicates,
            failed = t.failed,
            mappings_created = summary.mappings_created,
            cancelled = summary.cancelled,
            "Ingestion run complete"
        );
        Ok(summary)
    }

    /// Ingest one dataset, file by file.
    pub async fn ingest_dataset(
        &self,
        dataset: &Dataset,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<DatasetSummary> {
        let mut summary = DatasetSummary::new(&dataset.name);
        if *shutdown.borrow() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let dataset_id = match self.prepare(dataset, &mut summary).await {
            Ok(id) => id,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(dataset = %dataset.name, error = %e, "Could not register dataset, skipping");
                return Ok(summary);
            }
        };

        let ctx = Arc::new(ExtractContext {
            default_parameter: dataset.default_parameter.clone(),
            ..self.context.clone()
        });

        for file in &dataset.files {
            if *shutdown.borrow() {
                info!(dataset = %dataset.name, "Cancellation requested, stopping dataset");
                summary.cancelled = true;
                break;
            }
            let file_summary = self.ingest_file(dataset, dataset_id, file, ctx.clone()).await?;
            summary.push(file_summary);
        }

        let t = &summary.totals;
        info!(
            dataset = %dataset.name,
            files = t.files,
            skipped = t.files_skipped,
            kept = t.kept,
            dropped = t.dropped,
            inserted = t.inserted,
            duplicates = t.duplicates,
            failed = t.failed,
            "Dataset complete"
        );
        Ok(summary)
    }

    /// Register the dataset and clear it on reload. Dry runs do neither.
    async fn prepare(&self, dataset: &Dataset, summary: &mut DatasetSummary) -> StoreResult<DatasetId> {
        if self.config.dry_run {
            return Ok(Uuid::nil());
        }
        let id = self.registry.register(dataset).await?;
        if self.config.reload {
            summary.cleared = self.registry.clear_measurements(id).await?;
            info!(dataset = %dataset.name, cleared = summary.cleared, "Cleared dataset for reload");
        }
        Ok(id)
    }

    async fn ingest_file(
        &self,
        dataset: &Dataset,
        dataset_id: DatasetId,
        file: &Path,
        ctx: Arc<ExtractContext>,
    ) -> Result<FileSummary> {
        let Some(extractor) = extractor_for(file) else {
            let path = ExtractionPath::from_extension(file);
            debug!(file = %file.display(), path = path.as_str(), "No extractor for file");
            return Ok(FileSummary::skipped(
                file,
                path,
                FileIssue::UnsupportedFormat(format!("no extractor for {} files", path.as_str())),
            ));
        };
        let path = extractor.path();

        let extraction = match self.extract(extractor, file, ctx).await {
            Ok(extraction) => extraction,
            Err(issue) => {
                if issue.is_benign() {
                    debug!(file = %file.display(), issue = %issue, "Skipping file");
                } else {
                    warn!(dataset = %dataset.name, file = %file.display(), issue = %issue, "Skipping file");
                }
                return Ok(FileSummary::skipped(file, path, issue));
            }
        };

        let mut summary = FileSummary::new(file, path);
        summary.rows_read = extraction.rows_read;
        summary.time_rejections = extraction.time_rejections;
        summary.row_errors = extraction.row_errors;
        summary.missing_values = extraction.missing_values;
        summary.encoding = extraction.encoding.map(String::from);
        summary.truncated = extraction.truncated;

        let (kept, counts) = self
            .filter
            .apply(extraction.observations, |o| o.quality_flag);
        summary.record_quality(counts);

        let records = match self.standardize(kept, dataset, dataset_id).await {
            Ok(records) => records,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Mapping lookup failed, skipping file");
                summary.issue = Some(FileIssue::MappingUnavailable(e.to_string()));
                return Ok(summary);
            }
        };

        if self.config.dry_run {
            let invalid = records.iter().filter(|r| r.value.to_f64().is_none()).count();
            summary.conversion_errors = invalid;
            summary.failed = invalid;
        } else {
            let load = self.loader.load(records).await?;
            summary.record_load(&load);
        }

        info!(
            dataset = %dataset.name,
            file = %file.display(),
            rows = summary.rows_read,
            time_rejections = summary.time_rejections,
            kept = summary.kept,
            dropped = summary.dropped,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "File processed"
        );
        Ok(summary)
    }

    /// Run an extractor on the blocking pool, bounded by the file timeout.
    ///
    /// A timed-out extraction keeps running in the background until it
    /// finishes; its result is discarded.
    async fn extract(
        &self,
        extractor: Box<dyn Extractor>,
        file: &Path,
        ctx: Arc<ExtractContext>,
    ) -> std::result::Result<FileExtraction, FileIssue> {
        let owned = file.to_path_buf();
        let task = tokio::task::spawn_blocking(move || extractor.extract(&owned, &ctx));
        match tokio::time::timeout(self.config.file_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(FileIssue::Unreadable(format!("extraction task failed: {}", join))),
            Err(_) => Err(FileIssue::Timeout(self.config.file_timeout_secs)),
        }
    }

    /// Resolve each distinct raw name once and build candidate records.
    async fn standardize(
        &self,
        kept: Vec<(Observation, QualityFlag)>,
        dataset: &Dataset,
        dataset_id: DatasetId,
    ) -> std::result::Result<Vec<CandidateRecord>, StoreError> {
        let mut resolved: HashMap<String, Mapping> = HashMap::new();
        let mut records = Vec::with_capacity(kept.len());

        for (obs, quality_flag) in kept {
            if !resolved.contains_key(&obs.raw_parameter) {
                let mapping = self
                    .standardizer
                    .standardize(&obs.raw_parameter, obs.declared_unit.as_deref(), dataset.namespace_hint)
                    .await?;
                resolved.insert(obs.raw_parameter.clone(), mapping);
            }
            let mapping = &resolved[&obs.raw_parameter];

            let unit = match obs.declared_unit {
                Some(declared) if mapping.unit == UNKNOWN_UNIT => declared,
                _ => mapping.unit.clone(),
            };
            records.push(CandidateRecord {
                timestamp: obs.timestamp,
                dataset_id,
                standard_code: mapping.standard_code.clone(),
                namespace: mapping.namespace,
                value: obs.value,
                unit,
                quality_flag,
                location: obs.location,
            });
        }
        Ok(records)
    }

    /// Rank stored mappings for an unmapped raw name.
    pub async fn suggest(&self, raw_name: &str) -> StoreResult<Vec<Suggestion>> {
        self.standardizer.suggest(raw_name).await
    }
}
