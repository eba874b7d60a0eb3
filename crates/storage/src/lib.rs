//! Storage abstractions for the observation ingestion engine.
//!
//! Provides unified interfaces for:
//! - The mapping store (append-only, insert-if-absent)
//! - The measurement sink (atomic, deduplicating batch writes)
//! - The dataset registry
//!
//! with a PostgreSQL implementation ([`Catalog`]) and an in-memory one
//! ([`MemoryStore`]).

pub mod catalog;
pub mod datasets;
pub mod error;
pub mod mappings;
pub mod measurements;
pub mod memory;

pub use catalog::{Catalog, MAX_BATCH_ROWS};
pub use datasets::DatasetRegistry;
pub use error::{StoreError, StoreResult};
pub use mappings::{InsertOutcome, MappingStore};
pub use measurements::{BatchOutcome, MeasurementSink};
pub use memory::{MemoryStore, MemoryStoreStats};
