//! Recoverable row- and file-level problems.
//!
//! These never travel as `Err` through the pipeline: extraction returns
//! them as values, counters absorb them, and the run continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssue {
    /// No time encoding rule matched the row's time value.
    #[error("time format unknown")]
    TimeFormatUnknown,
    /// Non-numeric or non-finite value, or a structurally broken row.
    #[error("row conversion error")]
    RowConversionError,
    /// The value cell is empty or a fill value.
    #[error("missing value")]
    MissingValue,
}

/// Why a whole file was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FileIssue {
    /// Undecodable as UTF-8 and as every fallback encoding.
    #[error("could not decode text (tried {0:?})")]
    EncodingError(Vec<String>),

    /// No time or no value column/variable could be located.
    #[error("missing required columns: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    /// Zero-byte file or a file without data rows. A no-op, not a failure.
    #[error("empty file")]
    EmptyFile,

    #[error("unreadable file: {0}")]
    Unreadable(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The mapping store rejected a lookup or insert for this file.
    #[error("mapping store unavailable: {0}")]
    MappingUnavailable(String),
}

impl FileIssue {
    /// Skips that are expected and should not count as failed files.
    pub fn is_benign(&self) -> bool {
        matches!(self, FileIssue::EmptyFile | FileIssue::UnsupportedFormat(_))
    }
}
