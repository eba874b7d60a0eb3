//! Observation ingestion library.
//!
//! Turns heterogeneous observation files (delimited tables, NetCDF) into
//! canonical measurement records and loads them idempotently.
//!
//! # Architecture
//!
//! - [`discovery`] finds datasets (one directory each) under an input root
//! - [`extract`] reads tabular and array files into raw observations,
//!   normalizing time through [`time::TimeNormalizer`]
//! - [`quality::QualityFilter`] keeps or drops observations by flag
//! - [`standardize::ParameterStandardizer`] resolves raw parameter names
//!   against the mapping store, creating `custom` mappings on a miss
//! - [`loader::BatchLoader`] writes deduplicated batches
//! - [`scanner::DiagnosticScanner`] predicts outcomes without loading
//!
//! [`Ingester`] wires these together for a full run.

pub mod aliases;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod extract;
mod ingester;
pub mod issue;
pub mod loader;
pub mod quality;
pub mod scanner;
pub mod standardize;
pub mod summary;
pub mod time;

// Re-exports
pub use config::{IngestConfig, YearRange};
pub use discovery::{discover_datasets, DatasetManifest};
pub use error::{IngestionError, Result};
pub use extract::{ExtractContext, ExtractionPath, Extractor, FileExtraction, Observation};
pub use ingester::Ingester;
pub use issue::{FileIssue, RowIssue};
pub use loader::{BatchLoader, LoadSummary};
pub use quality::{QualityCounts, QualityFilter, Verdict};
pub use scanner::{DiagnosticResult, DiagnosticScanner, FailureReason, FileDiagnostic, ScanReport};
pub use standardize::{suggest, MatchConfidence, ParameterStandardizer, Suggestion};
pub use summary::{DatasetSummary, FileSummary, RunSummary, Totals};
pub use time::{DeclaredOffset, TimeNormalizer};
