//! Store client error types
//!
//! Error codes:
//! - CQ_STORE_UNAVAILABLE (ERROR)
//! - CQ_STORE_TIMEOUT (ERROR)
//! - CQ_STORE_UNKNOWN_COLUMN_FAMILY (ERROR)
//! - CQ_STORE_INVALID_REQUEST (ERROR)
//!
//! The core never retries a store call; retry policy belongs to the client.

use thiserror::Error;

/// Failures reported by a [`super::StoreClient`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store request timed out after {0}ms")]
    Timeout(u64),

    #[error("unknown column family: {0}")]
    UnknownColumnFamily(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "CQ_STORE_UNAVAILABLE",
            StoreError::Timeout(_) => "CQ_STORE_TIMEOUT",
            StoreError::UnknownColumnFamily(_) => "CQ_STORE_UNKNOWN_COLUMN_FAMILY",
            StoreError::InvalidRequest(_) => "CQ_STORE_INVALID_REQUEST",
        }
    }
}

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;
