//! Server test utilities.

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use reel_core::SessionId;
use reel_core::config::{AppConfig, MetadataConfig, StorageConfig};
use reel_metadata::SqliteStore;
use reel_server::{AppState, create_router};
use reel_storage::FilesystemBackend;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary filesystem storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig::for_testing(temp_dir.path());
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path.clone(),
            busy_timeout_secs: 5,
        };
        modifier(&mut config);

        let storage = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let registry = Arc::new(
            SqliteStore::new(&db_path, Duration::from_secs(5))
                .await
                .expect("Failed to create session registry"),
        );

        reel_server::metrics::register_metrics();
        let state = AppState::new(config, storage, registry);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Upload one chunk as `owner`.
    pub async fn put_chunk(
        &self,
        session_id: SessionId,
        index: u32,
        total_chunks: u32,
        owner: &str,
        payload: impl Into<Body>,
    ) -> Response<Body> {
        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!(
                "/v1/uploads/{session_id}/chunks/{index}?total_chunks={total_chunks}"
            ))
            .header("x-owner-id", owner)
            .body(payload.into())
            .unwrap();
        self.send(request).await
    }

    /// GET a path with optional extra headers.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Upload every chunk in order and return the final response body.
    pub async fn upload_all(&self, session_id: SessionId, chunks: &[&'static str]) -> Value {
        let total = chunks.len() as u32;
        let mut last = Value::Null;
        for (index, chunk) in chunks.iter().enumerate() {
            let response = self
                .put_chunk(session_id, index as u32, total, "alice", *chunk)
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            last = json_body(response).await;
        }
        last
    }
}

/// Read a response body to bytes.
#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Body is not JSON")
}
