//! Merge behavior under injected storage faults.

mod common;

use bytes::Bytes;
use common::{TestHarness, read_all, submission};
use reel_assembly::{MergeEngine, UploadError};
use reel_core::{SessionId, UploadState};
use reel_metadata::TransitionDetail;
use reel_storage::ObjectStore;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_rename_fault_fails_session_and_keeps_chunks() {
    let harness = TestHarness::filesystem().await;
    harness.store.fail_rename.store(true, Ordering::SeqCst);
    let id = SessionId::new();

    harness
        .service
        .submit_chunk(submission(id, 1, 2, "BBB"))
        .await
        .unwrap();
    let err = harness
        .service
        .submit_chunk(submission(id, 0, 2, "AAA"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::StorageFailure(_)));

    let session = harness.service.session(id).await.unwrap();
    assert_eq!(session.state, UploadState::Failed);
    assert_eq!(session.error_code.as_deref(), Some("storage_failure"));
    assert!(session.artifact.is_none());

    // Chunks survive for diagnosis; the staging object is left in place.
    for index in 0..2 {
        assert!(harness.store.exists(&id.chunk_key(index)).await.unwrap());
    }
    assert_eq!(
        harness.store.list(&id.staging_prefix()).await.unwrap().len(),
        1
    );
    assert!(!harness.store.exists(&id.artifact_key()).await.unwrap());

    match harness.service.stream_artifact(id, None).await {
        Err(UploadError::NotReady { state, .. }) => assert_eq!(state, UploadState::Failed),
        other => panic!("expected NotReady, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_session_rejects_further_chunks() {
    let harness = TestHarness::new().await;
    harness.store.fail_rename.store(true, Ordering::SeqCst);
    let id = SessionId::new();

    let _ = harness.service.submit_chunk(submission(id, 0, 1, "x")).await;
    harness.store.fail_rename.store(false, Ordering::SeqCst);

    match harness.service.submit_chunk(submission(id, 0, 1, "x")).await {
        Err(UploadError::SessionFailed { code, .. }) => assert_eq!(code, "storage_failure"),
        other => panic!("expected SessionFailed, got {other:?}"),
    }
    assert_eq!(harness.store.renames(), 1);
}

#[tokio::test]
async fn test_staging_fault_fails_session() {
    let harness = TestHarness::new().await;
    harness.store.fail_staging_write.store(true, Ordering::SeqCst);
    let id = SessionId::new();

    let err = harness
        .service
        .submit_chunk(submission(id, 0, 1, "payload"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::StorageFailure(_)));
    assert_eq!(harness.store.renames(), 0);

    let session = harness.service.session(id).await.unwrap();
    assert_eq!(session.state, UploadState::Failed);
    assert!(harness.store.exists(&id.chunk_key(0)).await.unwrap());
}

#[tokio::test]
async fn test_missing_chunk_fails_merge_without_partial_artifact() {
    let harness = TestHarness::new().await;
    let id = SessionId::new();

    harness
        .service
        .submit_chunk(submission(id, 0, 3, "AAA"))
        .await
        .unwrap();
    harness
        .service
        .submit_chunk(submission(id, 1, 3, "BBB"))
        .await
        .unwrap();

    // Lose chunk 1 behind the registry's back, then complete the set.
    harness.store.inner().delete(&id.chunk_key(1)).await.unwrap();

    match harness
        .service
        .submit_chunk(submission(id, 2, 3, "CCC"))
        .await
    {
        Err(UploadError::MissingChunk { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected MissingChunk, got {other:?}"),
    }

    let session = harness.service.session(id).await.unwrap();
    assert_eq!(session.state, UploadState::Failed);
    assert_eq!(session.error_code.as_deref(), Some("missing_chunk"));
    assert!(!harness.store.exists(&id.artifact_key()).await.unwrap());
    assert!(harness.store.list(&id.staging_prefix()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_fault_still_completes() {
    let harness = TestHarness::new().await;
    harness.store.fail_purge.store(true, Ordering::SeqCst);
    let id = SessionId::new();

    let outcome = harness
        .service
        .submit_chunk(submission(id, 0, 1, "kept"))
        .await
        .unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.state, UploadState::Complete);

    // Publish succeeded, so readers are served while leftovers await retention.
    let opened = harness.service.stream_artifact(id, None).await.unwrap();
    assert_eq!(read_all(opened.stream).await, b"kept");
    assert!(harness.store.exists(&id.chunk_key(0)).await.unwrap());
}

#[tokio::test]
async fn test_chunk_landing_after_first_purge_is_reclaimed() {
    let harness = TestHarness::filesystem().await;
    let id = SessionId::new();

    harness
        .service
        .submit_chunk(submission(id, 1, 2, "BBB"))
        .await
        .unwrap();
    *harness.store.land_after_first_purge.lock().unwrap() =
        Some((id.chunk_key(0), Bytes::from_static(b"AAA")));

    let outcome = harness
        .service
        .submit_chunk(submission(id, 0, 2, "AAA"))
        .await
        .unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.state, UploadState::Complete);

    assert!(!harness.store.exists(&id.chunk_key(0)).await.unwrap());
    assert!(harness.store.list(&id.chunk_prefix()).await.unwrap().is_empty());

    let opened = harness.service.stream_artifact(id, None).await.unwrap();
    assert_eq!(read_all(opened.stream).await, b"AAABBB");
}

#[tokio::test]
async fn test_merge_requires_merging_state() {
    let harness = TestHarness::new().await;
    let id = SessionId::new();
    harness
        .service
        .submit_chunk(submission(id, 0, 2, "a"))
        .await
        .unwrap();

    let engine = MergeEngine::new(harness.store.clone(), harness.registry.clone());
    let session = harness.service.session(id).await.unwrap();
    assert!(matches!(
        engine.merge_once(&session).await,
        Err(UploadError::InvalidTransition { .. })
    ));

    // Still uploading: a refused merge changes nothing.
    let session = harness.service.session(id).await.unwrap();
    assert_eq!(session.state, UploadState::Uploading);
}

#[tokio::test]
async fn test_merge_engine_publishes_directly() {
    let harness = TestHarness::new().await;
    let id = SessionId::new();
    harness
        .service
        .submit_chunk(submission(id, 1, 2, "-world"))
        .await
        .unwrap();

    // Put chunk 0 in place and claim the merge by hand.
    harness
        .store
        .put(&id.chunk_key(0), bytes::Bytes::from("hello"))
        .await
        .unwrap();
    harness.registry.mark_received(id, 0, 2, 5).await.unwrap();
    harness
        .registry
        .transition(id, UploadState::Uploading, UploadState::Merging, TransitionDetail::None)
        .await
        .unwrap();

    let engine = MergeEngine::new(harness.store.clone(), harness.registry.clone());
    let session = harness.service.session(id).await.unwrap();
    let artifact = engine.merge_once(&session).await.unwrap();
    assert_eq!(artifact.key, id.artifact_key());
    assert_eq!(artifact.size, 11);

    let opened = harness.service.stream_artifact(id, None).await.unwrap();
    assert_eq!(read_all(opened.stream).await, b"hello-world");
}
