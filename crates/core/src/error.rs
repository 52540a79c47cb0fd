//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),

    #[error("invalid upload state: {0}")]
    InvalidState(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
