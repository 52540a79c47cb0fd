//! Fault-injecting object store wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use reel_storage::error::{StorageError, StorageResult};
use reel_storage::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Delegates to an inner store, counting merges and failing on request.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    pub fail_rename: AtomicBool,
    pub fail_purge: AtomicBool,
    pub fail_staging_write: AtomicBool,
    /// Pause inside each rename so racing callers overlap the merge.
    pub rename_delay_ms: AtomicUsize,
    /// Pause inside each chunk put so racing first arrivals overlap.
    pub chunk_put_delay_ms: AtomicUsize,
    /// Object written right after the first prefix purge completes, as a
    /// duplicate chunk write would when it loses the race with the purge.
    pub land_after_first_purge: Mutex<Option<(String, Bytes)>>,
    pub renames: AtomicUsize,
    pub staging_uploads: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_rename: AtomicBool::new(false),
            fail_purge: AtomicBool::new(false),
            fail_staging_write: AtomicBool::new(false),
            rename_delay_ms: AtomicUsize::new(0),
            chunk_put_delay_ms: AtomicUsize::new(0),
            land_after_first_purge: Mutex::new(None),
            renames: AtomicUsize::new(0),
            staging_uploads: AtomicUsize::new(0),
        })
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    pub fn renames(&self) -> usize {
        self.renames.load(Ordering::SeqCst)
    }

    pub fn staging_uploads(&self) -> usize {
        self.staging_uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn get_range_stream(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream> {
        self.inner.get_range_stream(key, start, end).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let delay = self.chunk_put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 && key.starts_with("chunks/") {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        if key.starts_with("staging/") {
            self.staging_uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_staging_write.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other(
                    "injected staging failure",
                )));
            }
        }
        self.inner.put_stream(key).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.renames.fetch_add(1, Ordering::SeqCst);
        let delay = self.rename_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected rename failure",
            )));
        }
        self.inner.rename(from, to).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected purge failure",
            )));
        }
        let removed = self.inner.delete_prefix(prefix).await?;
        let late = self.land_after_first_purge.lock().unwrap().take();
        if let Some((key, data)) = late {
            self.inner.put(&key, data).await?;
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
