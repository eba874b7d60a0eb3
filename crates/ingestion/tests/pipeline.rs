//! End-to-end runs of the ingestion pipeline against the in-memory store.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use ingestion::{FileIssue, IngestConfig, Ingester, RunSummary};
use obs_common::{DatasetId, Mapping, Measurement, Namespace};
use storage::{BatchOutcome, MappingStore, MeasurementSink, MemoryStore, StoreError, StoreResult};
use test_utils::{flagged_series, january_series, DatasetTree};

fn ingester(store: &Arc<MemoryStore>, config: IngestConfig) -> Ingester {
    Ingester::new(config, store.clone(), store.clone(), store.clone()).unwrap()
}

async fn run(store: &Arc<MemoryStore>, tree: &DatasetTree) -> RunSummary {
    ingester(store, IngestConfig::default())
        .run(tree.root(), watch::channel(false).1)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_file_stem_resolves_seeded_mapping() {
    let tree = DatasetTree::new();
    tree.write("north_sea", "TEMP.csv", "date,value\n2021-03-19,12.5\n2021-03-20,12.7\n");
    let store = Arc::new(MemoryStore::new());
    store
        .seed(&[Mapping::new("TEMP", "TEMP", Namespace::Bodc, "Degrees Celsius")])
        .await
        .unwrap();

    let summary = run(&store, &tree).await;
    assert_eq!(summary.totals.inserted, 2);
    assert_eq!(summary.mappings_created, 0);

    let stored = store.measurements().await;
    assert_eq!(stored.len(), 2);
    for m in &stored {
        assert_eq!(m.standard_code, "TEMP");
        assert_eq!(m.namespace, Namespace::Bodc);
        assert_eq!(m.unit, "Degrees Celsius");
    }
    assert_eq!(store.mapping_count().await, 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let tree = DatasetTree::new();
    tree.write("ds", "TEMP.csv", january_series(1, 20));
    let store = Arc::new(MemoryStore::new());

    let first = run(&store, &tree).await;
    assert_eq!(first.totals.inserted, 20);

    let second = run(&store, &tree).await;
    assert_eq!(second.totals.inserted, 0);
    assert_eq!(second.totals.duplicates, 20);
    assert_eq!(store.measurement_count().await, 20);
    assert_eq!(store.mapping_count().await, 1);
}

#[tokio::test]
async fn test_all_bad_flags_keep_nothing() {
    let tree = DatasetTree::new();
    tree.write("ds", "TEMP.csv", flagged_series(7, 4));
    let store = Arc::new(MemoryStore::new());

    let summary = run(&store, &tree).await;
    let file = &summary.datasets[0].files[0];
    assert_eq!(file.rows_read, 7);
    assert_eq!(file.kept, 0);
    assert_eq!(file.dropped, 7);
    assert!(file.issue.is_none());
    assert_eq!(store.measurement_count().await, 0);
}

#[tokio::test]
async fn test_overlapping_files_store_the_union() {
    let tree = DatasetTree::new();
    tree.manifest("mooring", "parameter: TEMP\n");
    tree.write("mooring", "part1.csv", january_series(1, 10));
    tree.write("mooring", "part2.csv", january_series(6, 10));
    let store = Arc::new(MemoryStore::new());

    let summary = run(&store, &tree).await;
    assert_eq!(summary.totals.kept, 20);
    assert_eq!(summary.totals.inserted, 15);
    assert_eq!(summary.totals.duplicates, 5);
    assert_eq!(store.measurement_count().await, 15);
}

#[tokio::test]
async fn test_empty_file_does_not_stop_dataset() {
    let tree = DatasetTree::new();
    tree.write("ds", "000_empty.csv", "");
    tree.write("ds", "TEMP.csv", january_series(1, 3));
    let store = Arc::new(MemoryStore::new());

    let summary = run(&store, &tree).await;
    let files = &summary.datasets[0].files;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].issue, Some(FileIssue::EmptyFile));
    assert_eq!(files[0].rows_read, 0);
    assert_eq!(files[1].inserted, 3);
    assert_eq!(summary.totals.files_failed, 0);
}

#[tokio::test]
async fn test_broken_files_are_reported_and_skipped() {
    let tree = DatasetTree::new();
    tree.write("ds", "a.csv", "station,depth\nA,10\n");
    tree.write("ds", "b.csv", b"date,value\n2021-01-01,1\n\xFF\xFE\xFA".to_vec());
    tree.write("ds", "c.csv", "date,value\n2021-01-01,1\nnot a date,2\n");
    let store = Arc::new(MemoryStore::new());

    let config = IngestConfig {
        fallback_encodings: Vec::new(),
        ..Default::default()
    };
    let summary = ingester(&store, config)
        .run(tree.root(), watch::channel(false).1)
        .await
        .unwrap();

    let files = &summary.datasets[0].files;
    assert!(matches!(files[0].issue, Some(FileIssue::MissingRequiredColumns(_))));
    assert!(matches!(files[1].issue, Some(FileIssue::EncodingError(_))));
    assert_eq!(files[2].time_rejections, 1);
    assert_eq!(files[2].inserted, 1);
    assert_eq!(summary.totals.files_failed, 2);
}

#[tokio::test]
async fn test_concurrent_datasets_share_one_mapping() {
    let tree = DatasetTree::new();
    for name in ["a", "b", "c", "d"] {
        tree.manifest(name, "parameter: Turbidity\n");
        tree.write(name, "obs.csv", january_series(1, 5));
    }
    let store = Arc::new(MemoryStore::new());
    let config = IngestConfig {
        max_concurrent_datasets: 4,
        ..Default::default()
    };

    let summary = ingester(&store, config)
        .run(tree.root(), watch::channel(false).1)
        .await
        .unwrap();
    assert_eq!(summary.datasets.len(), 4);
    assert_eq!(summary.totals.inserted, 20);
    assert_eq!(summary.mappings_created, 1);
    assert_eq!(store.mapping_count().await, 1);
    let mapping = store.get("turbidity").await.unwrap().unwrap();
    assert_eq!(mapping.standard_code, "TURBIDITY");
    assert_eq!(mapping.namespace, Namespace::Custom);
}

#[tokio::test]
async fn test_filter_and_row_limit() {
    let tree = DatasetTree::new();
    tree.write("north_sea_ctd", "TEMP.csv", january_series(1, 10));
    tree.write("baltic_ctd", "TEMP.csv", january_series(1, 10));
    let store = Arc::new(MemoryStore::new());
    let config = IngestConfig {
        dataset_filter: Some("NORTH".into()),
        row_limit: Some(3),
        ..Default::default()
    };

    let summary = ingester(&store, config)
        .run(tree.root(), watch::channel(false).1)
        .await
        .unwrap();
    assert_eq!(summary.datasets.len(), 1);
    assert_eq!(summary.datasets[0].dataset, "north_sea_ctd");
    assert!(summary.datasets[0].files[0].truncated);
    assert_eq!(summary.totals.inserted, 3);
}

/// Forwards to a memory store and requests shutdown after the first batch.
struct StopAfterFirstBatch {
    store: Arc<MemoryStore>,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl MeasurementSink for StopAfterFirstBatch {
    async fn write_batch(&self, batch: &[Measurement]) -> StoreResult<BatchOutcome> {
        let outcome = self.store.write_batch(batch).await?;
        let _ = self.shutdown.send(true);
        Ok(outcome)
    }

    async fn count(&self, dataset_id: DatasetId) -> StoreResult<u64> {
        self.store.count(dataset_id).await
    }
}

#[tokio::test]
async fn test_cancellation_stops_after_current_file() {
    let tree = DatasetTree::new();
    tree.manifest("ds", "parameter: TEMP\n");
    tree.write("ds", "1.csv", january_series(1, 5));
    tree.write("ds", "2.csv", january_series(6, 5));
    tree.write("ds", "3.csv", january_series(11, 5));

    let store = Arc::new(MemoryStore::new());
    let (tx, rx) = watch::channel(false);
    let sink = Arc::new(StopAfterFirstBatch {
        store: store.clone(),
        shutdown: tx,
    });
    let ingester = Ingester::new(IngestConfig::default(), store.clone(), store.clone(), sink).unwrap();

    let summary = ingester.run(tree.root(), rx).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.totals.files, 1);
    assert_eq!(store.measurement_count().await, 5);
}

struct Unreachable;

#[async_trait]
impl MeasurementSink for Unreachable {
    async fn write_batch(&self, _batch: &[Measurement]) -> StoreResult<BatchOutcome> {
        Err(StoreError::Connectivity("connection refused".into()))
    }

    async fn count(&self, _dataset_id: DatasetId) -> StoreResult<u64> {
        Err(StoreError::Connectivity("connection refused".into()))
    }
}

#[tokio::test]
async fn test_connectivity_failure_aborts_run() {
    let tree = DatasetTree::new();
    tree.write("a", "TEMP.csv", january_series(1, 3));
    tree.write("b", "TEMP.csv", january_series(1, 3));
    let store = Arc::new(MemoryStore::new());
    let ingester =
        Ingester::new(IngestConfig::default(), store.clone(), store.clone(), Arc::new(Unreachable)).unwrap();

    let err = ingester
        .run(tree.root(), watch::channel(false).1)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_summary_serializes_to_json() {
    let tree = DatasetTree::new();
    tree.write("ds", "TEMP.csv", january_series(1, 2));
    tree.write("ds", "empty.csv", "");
    let store = Arc::new(MemoryStore::new());

    let summary = run(&store, &tree).await;
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["totals"]["inserted"], 2);
    assert_eq!(json["datasets"][0]["files"][1]["issue"]["kind"], "empty_file");
}
