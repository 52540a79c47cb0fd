//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("chunk {index} has an empty payload")]
    EmptyChunk { index: u32 },

    #[error("chunk {index} missing for session {session_id}")]
    MissingChunk { session_id: String, index: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
