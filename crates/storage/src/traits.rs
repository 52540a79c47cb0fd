//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store abstraction for chunk, staging and artifact blobs.
///
/// Keys are `/`-separated relative paths. Implementations must make `put`
/// and `rename` atomic: a reader observes either the previous object or the
/// complete new one, never a partial write.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Stream the half-open byte range `[start, end)` of an object.
    ///
    /// Fails with `InvalidRange` if the range is inverted or extends past
    /// the end of the object.
    async fn get_range_stream(&self, key: &str, start: u64, end: u64)
    -> StorageResult<ByteStream>;

    /// Put an object atomically, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload. The object becomes visible under `key`
    /// only when the upload is finished.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Atomically move an object to a new key, replacing any object there.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List objects with a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete every object under a prefix, returning how many were removed.
    ///
    /// Succeeds with 0 when nothing matches, so callers may retry freely.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let mut removed = 0;
        for key in self.list(prefix).await? {
            match self.delete(&key).await {
                Ok(()) => removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "memory", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Validate a `[start, end)` range against an object of `size` bytes.
pub(crate) fn check_range(start: u64, end: u64, size: u64) -> StorageResult<()> {
    if end < start {
        return Err(StorageError::InvalidRange(format!(
            "end ({end}) < start ({start})"
        )));
    }
    if end > size {
        return Err(StorageError::InvalidRange(format!(
            "end ({end}) exceeds object size ({size})"
        )));
    }
    Ok(())
}
