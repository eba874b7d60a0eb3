//! Measurement sink: deduplicating bulk writes of canonical records.

use async_trait::async_trait;

use obs_common::{DatasetId, Measurement};

use crate::error::StoreResult;

/// Counts from one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows newly stored.
    pub inserted: usize,
    /// Rows whose dedup key already existed (in storage or earlier in the batch).
    pub duplicates: usize,
}

/// Destination for canonical measurements.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Write one batch atomically. Rows that violate the dedup key are
    /// skipped and counted as duplicates; they never abort the batch.
    async fn write_batch(&self, batch: &[Measurement]) -> StoreResult<BatchOutcome>;

    /// Number of stored measurements for a dataset.
    async fn count(&self, dataset_id: DatasetId) -> StoreResult<u64>;
}
