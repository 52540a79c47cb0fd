//! Core domain types and shared logic for Reel.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session identity, ownership and lifecycle state
//! - Chunk records and the persisted object key layout
//! - Artifact digests
//! - Configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod upload;

pub use chunk::{ChunkIndex, ChunkRecord};
pub use error::{Error, Result};
pub use hash::{ArtifactDigest, ArtifactHasher};
pub use upload::{OwnerId, PublishedArtifact, SessionId, UploadSession, UploadState};

/// Default maximum chunk payload: 100 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Default upper bound on the number of chunks in one session.
pub const DEFAULT_MAX_TOTAL_CHUNKS: u32 = 100_000;

/// Maximum length of an owner identifier.
pub const MAX_OWNER_ID_LEN: usize = 256;
