//! Common types shared across the observation ingestion crates.

pub mod dataset;
pub mod error;
pub mod mapping;
pub mod measurement;
pub mod quality;

pub use dataset::{Dataset, DatasetId};
pub use error::{CommonError, CommonResult};
pub use mapping::{
    derive_standard_code, normalize_raw_name, Mapping, MappingProvenance, Namespace, UNKNOWN_UNIT,
};
pub use measurement::{CandidateRecord, DedupKey, LocationRef, Measurement, RawValue};
pub use quality::QualityFlag;
