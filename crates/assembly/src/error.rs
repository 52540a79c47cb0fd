//! Upload pipeline error taxonomy.

use reel_core::UploadState;
use reel_metadata::MetadataError;
use reel_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by chunk submission, merge and artifact reads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session {session_id} belongs to another owner")]
    OwnershipMismatch { session_id: String },

    #[error("chunk count mismatch: session expects {expected}, request declared {actual}")]
    ChunkCountMismatch { expected: u32, actual: u32 },

    #[error("storage failure: {0}")]
    StorageFailure(#[source] StorageError),

    #[error("chunk {index} missing for session {session_id}")]
    MissingChunk { session_id: String, index: u32 },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("session {session_id} is not ready: {state}")]
    NotReady {
        session_id: String,
        state: UploadState,
    },

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("range not satisfiable for artifact of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("session {session_id} failed ({code})")]
    SessionFailed { session_id: String, code: String },

    #[error("session registry error: {0}")]
    Registry(#[source] MetadataError),
}

impl UploadError {
    /// Stable machine-readable code, also persisted as a session's failure code.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation",
            UploadError::OwnershipMismatch { .. } => "ownership_mismatch",
            UploadError::ChunkCountMismatch { .. } => "chunk_count_mismatch",
            UploadError::StorageFailure(_) => "storage_failure",
            UploadError::MissingChunk { .. } => "missing_chunk",
            UploadError::InvalidTransition { .. } => "invalid_transition",
            UploadError::NotReady { .. } => "not_ready",
            UploadError::NotFound(_) => "not_found",
            UploadError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            UploadError::SessionFailed { .. } => "session_failed",
            UploadError::Registry(_) => "registry_failure",
        }
    }
}

impl From<reel_core::Error> for UploadError {
    fn from(err: reel_core::Error) -> Self {
        UploadError::Validation(err.to_string())
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingChunk { session_id, index } => {
                UploadError::MissingChunk { session_id, index }
            }
            StorageError::EmptyChunk { index } => {
                UploadError::Validation(format!("chunk {index} has an empty payload"))
            }
            other => UploadError::StorageFailure(other),
        }
    }
}

impl From<MetadataError> for UploadError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(id) => UploadError::NotFound(id),
            MetadataError::OwnershipMismatch { session_id } => {
                UploadError::OwnershipMismatch { session_id }
            }
            MetadataError::ChunkCountMismatch { expected, actual } => {
                UploadError::ChunkCountMismatch { expected, actual }
            }
            MetadataError::InvalidStateTransition { from, to } => {
                UploadError::InvalidTransition { from, to }
            }
            other => UploadError::Registry(other),
        }
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
