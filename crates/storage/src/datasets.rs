//! Dataset registry.

use async_trait::async_trait;

use obs_common::{Dataset, DatasetId};

use crate::error::StoreResult;

/// Registry of known datasets, keyed by name.
#[async_trait]
pub trait DatasetRegistry: Send + Sync {
    /// Register a dataset, or refresh the re-scan timestamp of an existing
    /// one. Always returns the same id for the same name.
    async fn register(&self, dataset: &Dataset) -> StoreResult<DatasetId>;

    /// Delete all measurements of a dataset ahead of an explicit reload.
    /// Returns the number of rows removed.
    async fn clear_measurements(&self, dataset_id: DatasetId) -> StoreResult<u64>;
}
