//! Read access to published artifacts.

use crate::error::{UploadError, UploadResult};
use reel_core::{SessionId, UploadState};
use reel_metadata::SessionRegistry;
use reel_storage::{ByteStream, ObjectStore, StorageError};
use std::sync::Arc;
use tracing::{error, instrument};

/// A requested byte range, with HTTP `Range` semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// `start-end`, end inclusive. An end past the artifact is clamped.
    Bounded { start: u64, end_inclusive: u64 },
    /// `start-`, through the last byte.
    From { start: u64 },
    /// `-len`, the final `len` bytes.
    Suffix { len: u64 },
}

impl ByteRange {
    /// Resolve against an artifact of `size` bytes into a half-open
    /// `[start, end)` span, or `None` when unsatisfiable.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match *self {
            ByteRange::Bounded {
                start,
                end_inclusive,
            } => {
                if start >= size || end_inclusive < start {
                    return None;
                }
                Some((start, end_inclusive.min(size - 1) + 1))
            }
            ByteRange::From { start } => (start < size).then_some((start, size)),
            ByteRange::Suffix { len } => {
                if len == 0 {
                    return None;
                }
                Some((size - len.min(size), size))
            }
        }
    }
}

/// An open artifact read.
pub struct ArtifactStream {
    /// Size of the whole artifact.
    pub total_size: u64,
    /// First byte served.
    pub start: u64,
    /// One past the last byte served.
    pub end: u64,
    /// Whether a range was requested.
    pub partial: bool,
    pub content_type: String,
    pub stream: ByteStream,
}

impl ArtifactStream {
    /// Number of bytes the stream yields.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("total_size", &self.total_size)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("partial", &self.partial)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Serves artifacts of `Complete` sessions. Never blocks on a merge.
#[derive(Clone)]
pub struct ArtifactReader {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn SessionRegistry>,
    content_type: String,
}

impl ArtifactReader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn SessionRegistry>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            content_type: content_type.into(),
        }
    }

    /// Open the artifact of a session, optionally restricted to a range.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn open(
        &self,
        session_id: SessionId,
        range: Option<ByteRange>,
    ) -> UploadResult<ArtifactStream> {
        let session = self
            .registry
            .get_session(session_id)
            .await?
            .ok_or_else(|| UploadError::NotFound(session_id.to_string()))?;

        if session.state != UploadState::Complete {
            return Err(UploadError::NotReady {
                session_id: session_id.to_string(),
                state: session.state,
            });
        }

        let artifact = session.artifact.ok_or_else(|| {
            UploadError::StorageFailure(StorageError::Backend(format!(
                "complete session {session_id} has no artifact record"
            )))
        })?;

        let meta = self.store.head(&artifact.key).await.map_err(|e| {
            if e.is_not_found() {
                error!(key = %artifact.key, "published artifact missing from storage");
            }
            UploadError::from(e)
        })?;
        if meta.size != artifact.size {
            error!(
                key = %artifact.key,
                recorded = artifact.size,
                stored = meta.size,
                "artifact size differs from registry"
            );
            return Err(UploadError::StorageFailure(StorageError::Backend(format!(
                "artifact {} is {} bytes, registry recorded {}",
                artifact.key, meta.size, artifact.size
            ))));
        }

        let size = meta.size;
        let (start, end) = match range {
            Some(range) => range
                .resolve(size)
                .ok_or(UploadError::RangeNotSatisfiable { size })?,
            None => (0, size),
        };

        let stream = self
            .store
            .get_range_stream(&artifact.key, start, end)
            .await?;

        Ok(ArtifactStream {
            total_size: size,
            start,
            end,
            partial: range.is_some(),
            content_type: self.content_type.clone(),
            stream,
        })
    }
}
