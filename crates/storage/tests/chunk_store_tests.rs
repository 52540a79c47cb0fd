// Chunk store behavior over the real backends: parallel writes,
// multi-block ordered reads and namespace purges.

mod common;

use bytes::Bytes;
use common::{InstrumentedBackend, seeded_bytes, sha256_hex};
use futures::{StreamExt, TryStreamExt};
use reel_core::SessionId;
use reel_storage::{
    ChunkStore, FilesystemBackend, MemoryBackend, ObjectStore, StorageError,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn filesystem_store() -> (TempDir, Arc<dyn ObjectStore>) {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path()).await.unwrap();
    (dir, Arc::new(backend))
}

async fn collect(chunks: &ChunkStore, id: SessionId, count: u32) -> Vec<u8> {
    let parts: Vec<Bytes> = chunks.read_ordered(id, count).try_collect().await.unwrap();
    parts.concat()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_writes_read_back_in_order() {
    let (_dir, store) = filesystem_store().await;
    let chunks = ChunkStore::new(store);
    let id = SessionId::new();

    // Chunks larger than one 64 KiB read block exercise multi-part streams.
    let payloads: Vec<Bytes> = (0..8).map(|i| seeded_bytes(i, 100_000 + i as usize)).collect();

    let mut handles = Vec::new();
    for (index, payload) in payloads.iter().cloned().enumerate().rev() {
        let chunks = chunks.clone();
        handles.push(tokio::spawn(async move {
            chunks.write(id, index as u32, payload).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let expected: Vec<u8> = payloads.concat();
    let actual = collect(&chunks, id, 8).await;
    assert_eq!(actual.len(), expected.len());
    assert_eq!(sha256_hex(&actual), sha256_hex(&expected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rewrites_of_one_index_leave_a_whole_payload() {
    let (_dir, store) = filesystem_store().await;
    let chunks = ChunkStore::new(store);
    let id = SessionId::new();

    let candidates: Vec<Bytes> = (0..6).map(|seed| seeded_bytes(seed, 200_000)).collect();
    let mut handles = Vec::new();
    for payload in candidates.iter().cloned() {
        let chunks = chunks.clone();
        handles.push(tokio::spawn(async move { chunks.write(id, 0, payload).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = collect(&chunks, id, 1).await;
    assert!(
        candidates.iter().any(|c| c.as_ref() == stored.as_slice()),
        "stored payload must equal exactly one of the writes"
    );
    assert_eq!(
        chunks.object_store().list(&id.chunk_prefix()).await.unwrap(),
        vec![id.chunk_key(0)]
    );
}

#[tokio::test]
async fn test_read_ordered_is_lazy() {
    let backend = InstrumentedBackend::new(Arc::new(MemoryBackend::new()));
    let chunks = ChunkStore::new(backend.clone());
    let id = SessionId::new();

    for index in 0..3 {
        chunks.write(id, index, Bytes::from("x")).await.unwrap();
    }

    let mut stream = chunks.read_ordered(id, 3);
    assert_eq!(backend.gets(), 0);

    stream.next().await.unwrap().unwrap();
    assert_eq!(backend.gets(), 1);

    drop(stream);
    assert_eq!(backend.gets(), 1);
}

#[tokio::test]
async fn test_missing_chunk_on_filesystem() {
    let (_dir, store) = filesystem_store().await;
    let chunks = ChunkStore::new(store);
    let id = SessionId::new();
    chunks.write(id, 0, Bytes::from("AAA")).await.unwrap();

    let err = chunks
        .read_ordered(id, 2)
        .try_collect::<Vec<Bytes>>()
        .await
        .unwrap_err();
    match err {
        StorageError::MissingChunk { session_id, index } => {
            assert_eq!(session_id, id.to_string());
            assert_eq!(index, 1);
        }
        other => panic!("expected MissingChunk, got {other:?}"),
    }
}

#[tokio::test]
async fn test_purge_through_default_prefix_delete() {
    let backend = InstrumentedBackend::new(Arc::new(MemoryBackend::new()));
    let chunks = ChunkStore::new(backend.clone());
    let id = SessionId::new();

    for index in 0..4 {
        chunks.write(id, index, Bytes::from("x")).await.unwrap();
    }
    assert_eq!(backend.puts(), 4);

    assert_eq!(chunks.purge(id).await.unwrap(), 4);
    assert_eq!(backend.deletes.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert_eq!(chunks.purge(id).await.unwrap(), 0);

    for index in 0..4 {
        assert!(!chunks.exists(id, index).await.unwrap());
    }
}

#[tokio::test]
async fn test_purge_on_filesystem_removes_session_directory() {
    let (dir, store) = filesystem_store().await;
    let chunks = ChunkStore::new(store);
    let id = SessionId::new();

    for index in 0..3 {
        chunks.write(id, index, Bytes::from("chunk")).await.unwrap();
    }
    let session_dir = dir.path().join("chunks").join(id.to_string());
    assert!(session_dir.is_dir());

    assert_eq!(chunks.purge(id).await.unwrap(), 3);
    assert!(!session_dir.exists());
    assert_eq!(chunks.purge(id).await.unwrap(), 0);
}
