//! In-process memory backend.
//!
//! Useful for tests and single-process deployments that do not need
//! artifacts to survive a restart.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload, check_range};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Clone)]
struct Entry {
    data: Bytes,
    modified: OffsetDateTime,
}

type Objects = Arc<RwLock<BTreeMap<String, Entry>>>;

/// Object store backed by a sorted in-memory map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Objects,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn entry(&self, key: &str) -> StorageResult<Entry> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let entry = self.entry(key).await?;
        Ok(ObjectMeta {
            size: entry.data.len() as u64,
            last_modified: Some(entry.modified),
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Ok(self.entry(key).await?.data)
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.entry(key).await?.data;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn get_range_stream(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream> {
        let data = self.entry(key).await?.data;
        check_range(start, end, data.len() as u64)?;
        let slice = data.slice(start as usize..end as usize);
        Ok(Box::pin(futures::stream::once(async move { Ok(slice) })))
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            Entry {
                data,
                modified: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        validate_key(key)?;
        Ok(Box::new(MemoryUpload {
            objects: self.objects.clone(),
            key: key.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        validate_key(from)?;
        validate_key(to)?;
        let mut objects = self.objects.write().await;
        let entry = objects
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        objects.insert(to.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok((before - objects.len()) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Buffers writes and inserts the object on `finish`.
struct MemoryUpload {
    objects: Objects,
    key: String,
    buffer: BytesMut,
}

#[async_trait]
impl StreamingUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let data = self.buffer.freeze();
        let size = data.len() as u64;
        self.objects.write().await.insert(
            self.key,
            Entry {
                data,
                modified: OffsetDateTime::now_utc(),
            },
        );
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
