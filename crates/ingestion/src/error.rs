//! Error types for the ingestion crate.
//!
//! Only run-level failures live here. Row- and file-level problems are
//! values (see [`crate::issue`]) that end up in the run summary.

use storage::StoreError;
use thiserror::Error;

/// Errors that abort an ingestion or scan run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input tree: {0}")]
    InvalidInput(String),
}

impl IngestionError {
    /// Whether the error must stop the whole run.
    ///
    /// Storage errors are only fatal for connectivity and authorization
    /// failures; a failed query fails the current batch and nothing else.
    pub fn is_fatal(&self) -> bool {
        match self {
            IngestionError::Storage(e) => e.is_fatal(),
            _ => true,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
