//! Chunk ingestion entry point.

use crate::error::{UploadError, UploadResult};
use crate::merge::MergeEngine;
use crate::reader::{ArtifactReader, ArtifactStream, ByteRange};
use bytes::Bytes;
use reel_core::config::ServerConfig;
use reel_core::{
    ChunkIndex, ChunkRecord, OwnerId, PublishedArtifact, SessionId, UploadSession, UploadState,
};
use reel_metadata::{ChunkReceipt, MetadataError, SessionRegistry, TransitionDetail};
use reel_storage::{ChunkStore, ObjectStore};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Limits applied to every submission before anything is written.
#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_chunk_size: u64,
    pub max_total_chunks: u32,
}

impl From<&ServerConfig> for UploadLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            max_total_chunks: config.max_total_chunks,
        }
    }
}

/// One chunk as delivered by a client.
#[derive(Clone, Debug)]
pub struct ChunkSubmission {
    pub session_id: SessionId,
    pub owner_id: OwnerId,
    pub index: ChunkIndex,
    pub total_chunks: u32,
    pub payload: Bytes,
}

/// What a submission achieved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub session_id: SessionId,
    /// True only for the call that won the merge and published the artifact.
    pub complete: bool,
    pub state: UploadState,
    pub received: u32,
    pub expected: u32,
    /// Present when `complete` is true.
    pub artifact: Option<PublishedArtifact>,
}

impl SubmitOutcome {
    fn pending(session_id: SessionId, receipt: ChunkReceipt, state: UploadState) -> Self {
        Self {
            session_id,
            complete: false,
            state,
            received: receipt.received,
            expected: receipt.expected,
            artifact: None,
        }
    }
}

/// Upload pipeline: chunk store, session registry, merge engine and reader.
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    chunks: ChunkStore,
    registry: Arc<dyn SessionRegistry>,
    merger: MergeEngine,
    reader: ArtifactReader,
    limits: UploadLimits,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn SessionRegistry>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            chunks: ChunkStore::new(store.clone()),
            merger: MergeEngine::new(store.clone(), registry.clone()),
            reader: ArtifactReader::new(
                store.clone(),
                registry.clone(),
                config.artifact_content_type.clone(),
            ),
            limits: UploadLimits::from(config),
            store,
            registry,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Store one chunk and, if it completes the session, merge it.
    ///
    /// The merge runs inside the call that wins the `Uploading -> Merging`
    /// transition. Every other caller gets `complete == false` along with
    /// the state it observed.
    #[instrument(
        skip(self, submission),
        fields(
            session_id = %submission.session_id,
            index = submission.index,
            total_chunks = submission.total_chunks,
            size = submission.payload.len(),
        )
    )]
    pub async fn submit_chunk(&self, submission: ChunkSubmission) -> UploadResult<SubmitOutcome> {
        self.validate(&submission)?;

        let ChunkSubmission {
            session_id,
            owner_id,
            index,
            total_chunks,
            payload,
        } = submission;

        let session = self
            .registry
            .get_or_create_session(session_id, &owner_id)
            .await?;

        // Fixed before any bytes land, so a conflicting first arrival is
        // rejected without overwriting the winner's blob.
        self.registry
            .claim_chunk_count(session_id, total_chunks)
            .await?;

        match session.state {
            UploadState::Uploading => {}
            UploadState::Merging | UploadState::Complete => {
                debug!(state = %session.state, "late chunk ignored");
                return Ok(SubmitOutcome {
                    session_id,
                    complete: false,
                    state: session.state,
                    received: session.received_count(),
                    expected: total_chunks,
                    artifact: None,
                });
            }
            UploadState::Failed => return Err(failed(&session)),
        }

        let record = self.chunks.write(session_id, index, payload).await?;
        let receipt = self
            .registry
            .mark_received(session_id, index, total_chunks, record.byte_length)
            .await?;

        match receipt.state {
            UploadState::Uploading => {}
            UploadState::Complete => {
                // This write landed after the merge reclaimed the namespace.
                if let Err(e) = self.chunks.purge(session_id).await {
                    warn!(error = %e, "purge of late chunk failed");
                }
                return Ok(SubmitOutcome::pending(session_id, receipt, receipt.state));
            }
            UploadState::Merging => {
                return Ok(SubmitOutcome::pending(session_id, receipt, receipt.state));
            }
            UploadState::Failed => {
                let session = self.session(session_id).await?;
                return Err(failed(&session));
            }
        }

        if !receipt.complete {
            return Ok(SubmitOutcome::pending(session_id, receipt, receipt.state));
        }

        match self
            .registry
            .transition(
                session_id,
                UploadState::Uploading,
                UploadState::Merging,
                TransitionDetail::None,
            )
            .await
        {
            Ok(()) => {}
            Err(MetadataError::InvalidStateTransition { from, .. }) => {
                debug!(state = %from, "another caller is merging");
                let state = self.session(session_id).await?.state;
                return Ok(SubmitOutcome::pending(session_id, receipt, state));
            }
            Err(e) => return Err(e.into()),
        }

        let session = self.session(session_id).await?;
        let artifact = self.merger.merge_once(&session).await?;

        Ok(SubmitOutcome {
            session_id,
            complete: true,
            state: UploadState::Complete,
            received: receipt.received,
            expected: receipt.expected,
            artifact: Some(artifact),
        })
    }

    /// Open the artifact of a completed session.
    pub async fn stream_artifact(
        &self,
        session_id: SessionId,
        range: Option<ByteRange>,
    ) -> UploadResult<ArtifactStream> {
        self.reader.open(session_id, range).await
    }

    /// Current view of a session.
    pub async fn session(&self, session_id: SessionId) -> UploadResult<UploadSession> {
        self.registry
            .get_session(session_id)
            .await?
            .ok_or_else(|| UploadError::NotFound(session_id.to_string()))
    }

    /// Chunks registered for a session, ordered by index.
    pub async fn received_chunks(&self, session_id: SessionId) -> UploadResult<Vec<ChunkRecord>> {
        Ok(self.registry.received_chunks(session_id).await?)
    }

    /// Check the object store and the registry.
    pub async fn health_check(&self) -> UploadResult<()> {
        self.store.health_check().await?;
        self.registry.health_check().await?;
        Ok(())
    }

    /// Name of the configured storage backend.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn validate(&self, submission: &ChunkSubmission) -> UploadResult<()> {
        let size = submission.payload.len() as u64;
        if size == 0 {
            return Err(UploadError::Validation("chunk payload is empty".to_string()));
        }
        if size > self.limits.max_chunk_size {
            return Err(UploadError::Validation(format!(
                "chunk is {size} bytes, limit is {}",
                self.limits.max_chunk_size
            )));
        }
        if submission.total_chunks == 0 || submission.total_chunks > self.limits.max_total_chunks {
            return Err(UploadError::Validation(format!(
                "total_chunks must be between 1 and {}",
                self.limits.max_total_chunks
            )));
        }
        if submission.index >= submission.total_chunks {
            return Err(UploadError::Validation(format!(
                "chunk index {} outside 0..{}",
                submission.index, submission.total_chunks
            )));
        }
        Ok(())
    }
}

fn failed(session: &UploadSession) -> UploadError {
    UploadError::SessionFailed {
        session_id: session.id.to_string(),
        code: session
            .error_code
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
