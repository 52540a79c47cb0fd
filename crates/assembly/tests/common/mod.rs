pub mod faults;

#[allow(unused_imports)]
pub use faults::FaultyStore;

use bytes::Bytes;
use reel_assembly::{ChunkSubmission, UploadService};
use reel_core::config::ServerConfig;
use reel_core::{OwnerId, SessionId};
use reel_metadata::{SessionRegistry, SqliteStore};
use reel_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Upload service over a fault-injecting store and a temp SQLite registry.
#[allow(dead_code)]
pub struct TestHarness {
    pub service: Arc<UploadService>,
    pub store: Arc<FaultyStore>,
    pub registry: Arc<dyn SessionRegistry>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestHarness {
    /// Memory-backed harness.
    pub async fn new() -> Self {
        Self::with_backend(|_| async { Arc::new(MemoryBackend::new()) as Arc<dyn ObjectStore> })
            .await
    }

    /// Filesystem-backed harness rooted in the temp directory.
    pub async fn filesystem() -> Self {
        Self::with_backend(|dir| async move {
            Arc::new(FilesystemBackend::new(dir.join("storage")).await.unwrap())
                as Arc<dyn ObjectStore>
        })
        .await
    }

    async fn with_backend<F, Fut>(make: F) -> Self
    where
        F: FnOnce(std::path::PathBuf) -> Fut,
        Fut: std::future::Future<Output = Arc<dyn ObjectStore>>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let inner = make(temp_dir.path().to_path_buf()).await;
        let store = FaultyStore::new(inner);
        let registry: Arc<dyn SessionRegistry> = Arc::new(
            SqliteStore::new(temp_dir.path().join("metadata.db"), Duration::from_secs(5))
                .await
                .expect("Failed to open registry"),
        );
        let config = ServerConfig {
            max_chunk_size: 1024 * 1024,
            max_total_chunks: 1000,
            ..Default::default()
        };
        let service = Arc::new(UploadService::new(
            store.clone(),
            registry.clone(),
            &config,
        ));

        Self {
            service,
            store,
            registry,
            _temp_dir: temp_dir,
        }
    }
}

#[allow(dead_code)]
pub fn owner() -> OwnerId {
    OwnerId::new("alice").unwrap()
}

#[allow(dead_code)]
pub fn submission(
    session_id: SessionId,
    index: u32,
    total_chunks: u32,
    payload: impl Into<Bytes>,
) -> ChunkSubmission {
    ChunkSubmission {
        session_id,
        owner_id: owner(),
        index,
        total_chunks,
        payload: payload.into(),
    }
}

/// Deterministic pseudo-random payload.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }
    Bytes::from(data)
}

/// Collect an artifact stream into memory.
#[allow(dead_code)]
pub async fn read_all(stream: reel_storage::ByteStream) -> Vec<u8> {
    use futures::TryStreamExt;
    let parts: Vec<Bytes> = stream.try_collect().await.unwrap();
    parts.concat()
}
