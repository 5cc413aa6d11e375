//! Error types for price_sync

use std::fmt;

/// Unified error type for price_sync operations
#[derive(Debug)]
pub enum SyncError {
    /// HTTP request failed (network error, timeout, etc.)
    Fetch(reqwest::Error),
    /// Supplier page returned a non-success status code
    HttpStatus(reqwest::StatusCode),
    /// Failed to encode or decode JSON
    Parse(serde_json::Error),
    /// Database operation failed
    Store(rusqlite::Error),
    /// Persisted history log for a product is not valid JSON
    HistoryCorrupt {
        product_id: i64,
        source: serde_json::Error,
    },
    /// A sync pass is already running
    SyncInProgress,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Fetch(e) => write!(f, "Fetch error: {}", e),
            SyncError::HttpStatus(status) => write!(f, "HTTP error: {}", status),
            SyncError::Parse(e) => write!(f, "Parse error: {}", e),
            SyncError::Store(e) => write!(f, "Store error: {}", e),
            SyncError::HistoryCorrupt { product_id, source } => {
                write!(f, "History log for product {} is corrupt: {}", product_id, source)
            }
            SyncError::SyncInProgress => write!(f, "A sync pass is already running"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Fetch(e) => Some(e),
            SyncError::HttpStatus(_) => None,
            SyncError::Parse(e) => Some(e),
            SyncError::Store(e) => Some(e),
            SyncError::HistoryCorrupt { source, .. } => Some(source),
            SyncError::SyncInProgress => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Fetch(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Store(err)
    }
}

/// Result alias for price_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
