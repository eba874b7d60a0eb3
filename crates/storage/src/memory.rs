//! In-memory implementation of every storage seam.
//!
//! Used for dry runs and tests. Each operation holds a single write lock,
//! which gives the same atomicity as the database: batch writes are
//! all-or-nothing and `insert_if_absent` is first-writer-wins.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use obs_common::{
    normalize_raw_name, Dataset, DatasetId, DedupKey, Mapping, MappingProvenance, Measurement,
};

use crate::datasets::DatasetRegistry;
use crate::error::StoreResult;
use crate::mappings::{InsertOutcome, MappingStore};
use crate::measurements::{BatchOutcome, MeasurementSink};

/// Operation counters, readable without taking locks.
#[derive(Debug, Default)]
pub struct MemoryStoreStats {
    pub batches_written: AtomicU64,
    pub mapping_inserts: AtomicU64,
    pub dataset_registrations: AtomicU64,
}

/// Process-local store for mappings, datasets and measurements.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<String, DatasetId>>,
    mappings: RwLock<BTreeMap<String, Mapping>>,
    measurements: RwLock<BTreeMap<DedupKey, Measurement>>,
    stats: MemoryStoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &MemoryStoreStats {
        &self.stats
    }

    /// Snapshot of all stored measurements, ordered by dedup key.
    pub async fn measurements(&self) -> Vec<Measurement> {
        self.measurements.read().await.values().cloned().collect()
    }

    pub async fn measurement_count(&self) -> usize {
        self.measurements.read().await.len()
    }

    pub async fn mapping_count(&self) -> usize {
        self.mappings.read().await.len()
    }
}

#[async_trait]
impl DatasetRegistry for MemoryStore {
    async fn register(&self, dataset: &Dataset) -> StoreResult<DatasetId> {
        self.stats.dataset_registrations.fetch_add(1, Ordering::Relaxed);
        let mut datasets = self.datasets.write().await;
        let id = *datasets
            .entry(dataset.name.clone())
            .or_insert_with(Uuid::new_v4);
        Ok(id)
    }

    async fn clear_measurements(&self, dataset_id: DatasetId) -> StoreResult<u64> {
        let mut measurements = self.measurements.write().await;
        let before = measurements.len();
        measurements.retain(|key, _| key.dataset_id != dataset_id);
        Ok((before - measurements.len()) as u64)
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn get(&self, raw_name: &str) -> StoreResult<Option<Mapping>> {
        let key = normalize_raw_name(raw_name);
        Ok(self.mappings.read().await.get(&key).cloned())
    }

    async fn insert_if_absent(&self, mapping: &Mapping) -> StoreResult<InsertOutcome> {
        let stored = mapping.clone().normalized();
        let key = stored.raw_name.clone();
        let mut mappings = self.mappings.write().await;
        if let Some(existing) = mappings.get(&key) {
            return Ok(InsertOutcome {
                mapping: existing.clone(),
                created: false,
            });
        }

        mappings.insert(key, stored.clone());
        self.stats.mapping_inserts.fetch_add(1, Ordering::Relaxed);
        Ok(InsertOutcome {
            mapping: stored,
            created: true,
        })
    }

    async fn update_unit(
        &self,
        raw_name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> StoreResult<bool> {
        let key = normalize_raw_name(raw_name);
        let mut mappings = self.mappings.write().await;
        match mappings.get_mut(&key) {
            Some(mapping) => {
                mapping.unit = unit.to_string();
                if let Some(description) = description {
                    mapping.description = Some(description.to_string());
                }
                mapping.provenance = MappingProvenance::Curated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn all(&self) -> StoreResult<Vec<Mapping>> {
        Ok(self.mappings.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl MeasurementSink for MemoryStore {
    async fn write_batch(&self, batch: &[Measurement]) -> StoreResult<BatchOutcome> {
        let mut measurements = self.measurements.write().await;
        let mut seen = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for m in batch {
            let key = m.dedup_key();
            if measurements.contains_key(&key) || !seen.insert(key.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            measurements.insert(key, m.clone());
            outcome.inserted += 1;
        }

        self.stats.batches_written.fetch_add(1, Ordering::Relaxed);
        Ok(outcome)
    }

    async fn count(&self, dataset_id: DatasetId) -> StoreResult<u64> {
        let measurements = self.measurements.read().await;
        Ok(measurements
            .keys()
            .filter(|k| k.dataset_id == dataset_id)
            .count() as u64)
    }
}
