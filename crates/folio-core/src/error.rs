//! Error types for Folio.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Persistence is disabled or a read/write failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored record does not match the expected structure.
    #[error("Invalid persisted shape for '{key}': {reason}")]
    InvalidPersistedShape { key: String, reason: String },

    /// A region heuristic could not be evaluated.
    #[error("Signal unavailable: {0}")]
    SignalUnavailable(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
