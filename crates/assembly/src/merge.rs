//! Exactly-once assembly of a session's chunks into the published artifact.

use crate::error::{UploadError, UploadResult};
use futures::StreamExt;
use reel_core::{
    ArtifactDigest, ArtifactHasher, PublishedArtifact, SessionId, UploadSession, UploadState,
};
use reel_metadata::{SessionRegistry, TransitionDetail};
use reel_storage::{ChunkStore, ObjectStore, StorageError};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Concatenates chunks in index order and publishes the result.
///
/// Callers must hold the `Uploading -> Merging` transition for the session
/// before calling [`merge_once`](Self::merge_once); the engine itself does
/// not arbitrate between concurrent callers.
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn ObjectStore>,
    chunks: ChunkStore,
    registry: Arc<dyn SessionRegistry>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self {
            chunks: ChunkStore::new(store.clone()),
            store,
            registry,
        }
    }

    /// Assemble and publish the artifact of a session in `Merging`.
    ///
    /// On any fault before publish the session moves to `Failed` and the
    /// chunk blobs are left in place.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn merge_once(&self, session: &UploadSession) -> UploadResult<PublishedArtifact> {
        let id = session.id;
        if session.state != UploadState::Merging {
            return Err(UploadError::InvalidTransition {
                from: session.state.to_string(),
                to: UploadState::Complete.to_string(),
            });
        }

        let Some(expected) = session.expected_chunks else {
            let err = UploadError::Validation("session has no expected chunk count".to_string());
            self.fail(id, &err).await;
            return Err(err);
        };

        let staging_key = id.staging_key();
        let (size, sha256) = match self.stage(id, expected, &staging_key).await {
            Ok(staged) => staged,
            Err(err) => {
                self.fail(id, &err).await;
                return Err(err);
            }
        };

        let artifact_key = id.artifact_key();
        if let Err(e) = self.store.rename(&staging_key, &artifact_key).await {
            warn!(staging_key = %staging_key, error = %e, "publish failed, staging object kept");
            let err = UploadError::from(e);
            self.fail(id, &err).await;
            return Err(err);
        }

        self.reclaim_chunks(id, "publish").await;

        let artifact = PublishedArtifact {
            key: artifact_key,
            size,
            sha256,
        };

        if let Err(e) = self
            .registry
            .transition(
                id,
                UploadState::Merging,
                UploadState::Complete,
                TransitionDetail::Published(artifact.clone()),
            )
            .await
        {
            let err = UploadError::from(e);
            self.fail(id, &err).await;
            return Err(err);
        }

        // A duplicate write racing the first purge can land a chunk after it.
        // Complete rejects further writes, so a second pass leaves nothing behind.
        self.reclaim_chunks(id, "completion").await;

        info!(
            size = artifact.size,
            sha256 = %artifact.sha256,
            chunks = expected,
            "artifact published"
        );

        Ok(artifact)
    }

    /// Delete the session's chunk blobs. Failures are logged, never fatal.
    async fn reclaim_chunks(&self, id: SessionId, after: &'static str) {
        match self.chunks.purge(id).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, after, "chunks reclaimed"),
            Err(e) => warn!(error = %e, after, "chunk purge failed"),
        }
    }

    /// Stream chunks into a fresh staging object, hashing as we go.
    async fn stage(
        &self,
        id: SessionId,
        expected: u32,
        staging_key: &str,
    ) -> UploadResult<(u64, ArtifactDigest)> {
        let mut upload = self.store.put_stream(staging_key).await?;
        let mut hasher = ArtifactHasher::new();
        let mut source = self.chunks.read_ordered(id, expected);

        while let Some(next) = source.next().await {
            let written = match next {
                Ok(bytes) => {
                    hasher.update(&bytes);
                    upload.write(bytes).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if let Err(abort_err) = upload.abort().await {
                    warn!(error = %abort_err, "failed to abort staging upload");
                }
                return Err(e.into());
            }
        }

        let size = upload.finish().await?;
        if size != hasher.len() {
            return Err(UploadError::StorageFailure(StorageError::Backend(format!(
                "staged {size} bytes but read {}",
                hasher.len()
            ))));
        }

        debug!(size, staging_key, "artifact staged");
        Ok((size, hasher.finalize()))
    }

    /// Record a merge fault. Errors here are logged; the original error wins.
    async fn fail(&self, id: SessionId, err: &UploadError) {
        let detail = TransitionDetail::Failed {
            code: err.code().to_string(),
            detail: err.to_string(),
        };
        match self
            .registry
            .transition(id, UploadState::Merging, UploadState::Failed, detail)
            .await
        {
            Ok(()) => warn!(session_id = %id, code = err.code(), error = %err, "merge failed"),
            Err(e) => error!(
                session_id = %id,
                error = %e,
                original = %err,
                "failed to record merge failure"
            ),
        }
    }
}
