//! Upload session repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use reel_core::{
    ChunkIndex, ChunkRecord, OwnerId, PublishedArtifact, SessionId, UploadSession, UploadState,
};

/// Result of registering one received chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkReceipt {
    /// Whether every expected index has now been received.
    pub complete: bool,
    /// Distinct indices received so far.
    pub received: u32,
    /// Expected total for the session.
    pub expected: u32,
    /// Session state observed inside the same transaction.
    pub state: UploadState,
}

/// Extra data recorded alongside a state transition.
#[derive(Clone, Debug, Default)]
pub enum TransitionDetail {
    #[default]
    None,
    /// Published artifact, required for `Merging -> Complete`.
    Published(PublishedArtifact),
    /// Failure diagnostics, required for `* -> Failed`.
    Failed { code: String, detail: String },
}

/// Repository for upload session operations.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Get a session, creating it in `Uploading` if absent.
    ///
    /// The owner is bound on creation. Returns `OwnershipMismatch` when an
    /// existing session belongs to someone else.
    async fn get_or_create_session(
        &self,
        session_id: SessionId,
        owner_id: &OwnerId,
    ) -> MetadataResult<UploadSession>;

    /// Get an upload session by ID.
    async fn get_session(&self, session_id: SessionId) -> MetadataResult<Option<UploadSession>>;

    /// Fix the session's expected total, or check it against the one
    /// already fixed.
    ///
    /// Runs before any chunk bytes are written so that requests declaring
    /// different totals cannot both store a payload. Returns the total the
    /// session now expects, or `ChunkCountMismatch`.
    async fn claim_chunk_count(
        &self,
        session_id: SessionId,
        total_chunks: u32,
    ) -> MetadataResult<u32>;

    /// Register a stored chunk in one atomic read-modify-write.
    ///
    /// The first call fixes the expected total; later calls must declare
    /// the same total or fail with `ChunkCountMismatch`. Repeated indices
    /// count once. Sessions that left `Uploading` are returned unchanged.
    async fn mark_received(
        &self,
        session_id: SessionId,
        index: ChunkIndex,
        total_chunks: u32,
        byte_length: u64,
    ) -> MetadataResult<ChunkReceipt>;

    /// Compare-and-swap the session state from `from` to `to`.
    ///
    /// Fails with `InvalidStateTransition` when the edge is illegal or the
    /// current state is not `from`; the error carries the actual state.
    async fn transition(
        &self,
        session_id: SessionId,
        from: UploadState,
        to: UploadState,
        detail: TransitionDetail,
    ) -> MetadataResult<()>;

    /// Received chunks ordered by index.
    async fn received_chunks(&self, session_id: SessionId) -> MetadataResult<Vec<ChunkRecord>>;
}
