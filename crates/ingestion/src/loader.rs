//! Batch loading of candidate records into a measurement sink.
//!
//! Records are converted to canonical measurements, chunked into batches
//! and written one batch at a time. Each batch is atomic on the sink side;
//! rows that hit the dedup key are counted as duplicates, never errors.
//!
//! Failure handling per batch:
//!
//! - connectivity / authorization → the error is returned and the run stops
//!   (earlier batches stay committed, the current one is not)
//! - any other storage error, or the batch timeout → the batch's rows are
//!   counted as failed and loading continues with the next batch

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use obs_common::{CandidateRecord, Measurement};
use storage::MeasurementSink;

use crate::config::IngestConfig;
use crate::error::Result;

/// Counts from one `load` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub inserted: usize,
    /// Rows already stored (or repeated within the input).
    pub duplicates: usize,
    /// Rows not stored: conversion errors plus rows of failed batches.
    pub failed: usize,
    /// Rows with a non-numeric or non-finite value.
    pub conversion_errors: usize,
    pub failed_batches: usize,
}

impl LoadSummary {
    pub fn merge(&mut self, other: &LoadSummary) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.conversion_errors += other.conversion_errors;
        self.failed_batches += other.failed_batches;
    }
}

/// Writes candidate records in fixed-size batches.
pub struct BatchLoader {
    sink: Arc<dyn MeasurementSink>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl BatchLoader {
    pub fn new(sink: Arc<dyn MeasurementSink>, batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    pub fn from_config(sink: Arc<dyn MeasurementSink>, config: &IngestConfig) -> Self {
        Self::new(sink, config.batch_size, config.batch_timeout())
    }

    /// Convert and write `records`.
    ///
    /// Returns `Err` only for fatal storage errors.
    pub async fn load(&self, records: Vec<CandidateRecord>) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        let mut measurements: Vec<Measurement> = Vec::with_capacity(records.len());
        for record in &records {
            match record.to_measurement() {
                Some(m) => measurements.push(m),
                None => {
                    debug!(
                        standard_code = %record.standard_code,
                        timestamp = %record.timestamp,
                        value = ?record.value,
                        "Dropping row with non-numeric value"
                    );
                    summary.conversion_errors += 1;
                    summary.failed += 1;
                }
            }
        }

        for (index, batch) in measurements.chunks(self.batch_size).enumerate() {
            match tokio::time::timeout(self.batch_timeout, self.sink.write_batch(batch)).await {
                Ok(Ok(outcome)) => {
                    summary.inserted += outcome.inserted;
                    summary.duplicates += outcome.duplicates;
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!(batch = index, rows = batch.len(), error = %e, "Fatal storage error");
                    return Err(e.into());
                }
                Ok(Err(e)) => {
                    warn!(batch = index, rows = batch.len(), error = %e, "Batch write failed");
                    summary.failed += batch.len();
                    summary.failed_batches += 1;
                }
                Err(_) => {
                    warn!(
                        batch = index,
                        rows = batch.len(),
                        timeout_secs = self.batch_timeout.as_secs_f64(),
                        "Batch write timed out"
                    );
                    summary.failed += batch.len();
                    summary.failed_batches += 1;
                }
            }
        }

        Ok(summary)
    }
}
