//! Chunk types.

use crate::upload::SessionId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Zero-based position of a chunk within its session.
pub type ChunkIndex = u32;

/// A stored chunk payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Session the chunk belongs to.
    pub session_id: SessionId,
    /// Position in the upload (0-indexed).
    pub index: ChunkIndex,
    /// Payload size in bytes.
    pub byte_length: u64,
    /// When the payload was durably stored.
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

impl ChunkRecord {
    /// Create a record stamped with the current time.
    pub fn new(session_id: SessionId, index: ChunkIndex, byte_length: u64) -> Self {
        Self {
            session_id,
            index,
            byte_length,
            stored_at: OffsetDateTime::now_utc(),
        }
    }

    /// Object key of the chunk blob.
    pub fn object_key(&self) -> String {
        self.session_id.chunk_key(self.index)
    }
}
