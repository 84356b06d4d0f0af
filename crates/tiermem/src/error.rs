//! Error types for tiermem

use thiserror::Error;
use uuid::Uuid;

/// Main error type for tiermem operations
#[derive(Error, Debug)]
pub enum TierMemError {
    /// The requested record does not exist in the record store
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// The embedding provider failed (after the single retry)
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The durable substrate could not be reached or rejected the operation
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store and the vector index disagree about a record
    #[error("Index inconsistency for record {0}")]
    IndexInconsistency(Uuid),

    /// A custom record kind that was never registered
    #[error("Unknown record kind: {0}")]
    UnknownKind(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TierMemError {
    /// True for errors that mean "the id is simply not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, TierMemError::NotFound(_))
    }
}

impl From<serde_json::Error> for TierMemError {
    fn from(e: serde_json::Error) -> Self {
        TierMemError::Serialization(e.to_string())
    }
}

/// Result type alias for tiermem operations
pub type Result<T> = std::result::Result<T, TierMemError>;
