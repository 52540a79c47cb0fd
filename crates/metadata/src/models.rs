//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use reel_core::{
    ArtifactDigest, ChunkIndex, ChunkRecord, OwnerId, PublishedArtifact, SessionId, UploadSession,
};
use sqlx::FromRow;
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub session_id: Uuid,
    pub owner_id: String,
    pub expected_chunks: Option<i64>,
    pub state: String,
    pub artifact_key: Option<String>,
    pub artifact_size: Option<i64>,
    pub artifact_sha256: Option<String>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UploadSessionRow {
    /// Build the domain session from this row and its received indices.
    pub fn into_session(self, received: BTreeSet<ChunkIndex>) -> MetadataResult<UploadSession> {
        let artifact = match (self.artifact_key, self.artifact_size, self.artifact_sha256) {
            (Some(key), Some(size), Some(sha256)) => Some(PublishedArtifact {
                key,
                size: to_u64(size, "artifact_size")?,
                sha256: ArtifactDigest::from_hex(&sha256)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(MetadataError::Internal(format!(
                    "session {} has a partially recorded artifact",
                    self.session_id
                )));
            }
        };

        Ok(UploadSession {
            id: SessionId::from_uuid(self.session_id),
            owner_id: OwnerId::new(self.owner_id)?,
            expected_chunks: self
                .expected_chunks
                .map(|n| to_u32(n, "expected_chunks"))
                .transpose()?,
            received,
            state: self.state.parse()?,
            artifact,
            error_code: self.error_code,
            error_detail: self.error_detail,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Received chunk record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadChunkRow {
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub byte_length: i64,
    pub received_at: OffsetDateTime,
}

impl TryFrom<UploadChunkRow> for ChunkRecord {
    type Error = MetadataError;

    fn try_from(row: UploadChunkRow) -> MetadataResult<Self> {
        Ok(ChunkRecord {
            session_id: SessionId::from_uuid(row.session_id),
            index: to_u32(row.chunk_index, "chunk_index")?,
            byte_length: to_u64(row.byte_length, "byte_length")?,
            stored_at: row.received_at,
        })
    }
}

pub(crate) fn to_u32(value: i64, column: &str) -> MetadataResult<u32> {
    u32::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64, column: &str) -> MetadataResult<u64> {
    u64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("{column} out of range: {value}")))
}
