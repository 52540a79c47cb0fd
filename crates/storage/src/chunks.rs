//! Per-session chunk storage on top of an [`ObjectStore`].

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use bytes::Bytes;
use futures::StreamExt;
use reel_core::{ChunkIndex, ChunkRecord, SessionId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Chunk payloads keyed by `(session id, chunk index)`.
///
/// Writes for different indices may run concurrently. A repeat write to
/// the same index replaces the earlier payload atomically.
#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
}

impl ChunkStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Underlying object store.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Persist one chunk payload.
    #[instrument(skip(self, payload), fields(session_id = %session_id, size = payload.len()))]
    pub async fn write(
        &self,
        session_id: SessionId,
        index: ChunkIndex,
        payload: Bytes,
    ) -> StorageResult<ChunkRecord> {
        if payload.is_empty() {
            return Err(StorageError::EmptyChunk { index });
        }

        let byte_length = payload.len() as u64;
        self.store.put(&session_id.chunk_key(index), payload).await?;
        debug!(index, byte_length, "chunk stored");

        Ok(ChunkRecord::new(session_id, index, byte_length))
    }

    /// Check whether a chunk payload is present.
    pub async fn exists(&self, session_id: SessionId, index: ChunkIndex) -> StorageResult<bool> {
        self.store.exists(&session_id.chunk_key(index)).await
    }

    /// Stream chunks `0..count` in index order.
    ///
    /// Nothing is opened until the stream is polled. An absent chunk ends
    /// the stream with [`StorageError::MissingChunk`] at its position.
    pub fn read_ordered(&self, session_id: SessionId, count: u32) -> ByteStream {
        let store = self.store.clone();

        let stream = async_stream::try_stream! {
            for index in 0..count {
                let key = session_id.chunk_key(index);
                let mut chunk = store.get_stream(&key).await.map_err(|e| match e {
                    StorageError::NotFound(_) => StorageError::MissingChunk {
                        session_id: session_id.to_string(),
                        index,
                    },
                    other => other,
                })?;

                while let Some(bytes) = chunk.next().await {
                    yield bytes?;
                }
            }
        };

        Box::pin(stream)
    }

    /// Remove every chunk of a session. Safe to repeat.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn purge(&self, session_id: SessionId) -> StorageResult<u64> {
        let removed = self.store.delete_prefix(&session_id.chunk_prefix()).await?;
        debug!(removed, "chunk namespace purged");
        Ok(removed)
    }
}
