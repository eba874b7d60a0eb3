//! Storage error type and classification of database failures.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connectivity(String),

    #[error("Database authorization failed: {0}")]
    Authorization(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

impl StoreError {
    /// Connectivity and authorization failures abort the whole run; every
    /// other storage error only fails the current unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connectivity(_) | StoreError::Authorization(_))
    }
}

/// SQLSTATE codes that mean the credentials or privileges are wrong.
const AUTH_SQLSTATES: &[&str] = &["28000", "28P01", "42501"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connectivity(err.to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                if AUTH_SQLSTATES.contains(&code.as_str()) {
                    StoreError::Authorization(err.to_string())
                } else if code.starts_with("08") {
                    StoreError::Connectivity(err.to_string())
                } else {
                    StoreError::Query(err.to_string())
                }
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StoreError::Connectivity("refused".into()).is_fatal());
        assert!(StoreError::Authorization("bad password".into()).is_fatal());
        assert!(!StoreError::Query("syntax".into()).is_fatal());
        assert!(!StoreError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_from_sqlx_pool_errors() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_fatal());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_fatal());
    }

    #[test]
    fn test_from_sqlx_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            StoreError::from(sqlx::Error::Io(io)),
            StoreError::Connectivity(_)
        ));
    }
}
