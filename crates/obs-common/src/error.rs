//! Error types for shared domain values.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while parsing shared domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommonError {
    #[error("Unknown parameter namespace: {0}")]
    UnknownNamespace(String),

    #[error("Invalid quality flag: {0}")]
    InvalidQualityFlag(String),
}
