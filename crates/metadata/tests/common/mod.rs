//! Registry test utilities.

use reel_core::{OwnerId, SessionId};
use reel_metadata::{MetadataResult, SessionRegistry, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A SQLite registry in a temp directory that is removed on drop.
pub struct TestMetadata {
    pub store: Arc<dyn SessionRegistry>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let store =
            SqliteStore::new(temp_dir.path().join("test.db"), Duration::from_secs(5)).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> &Arc<dyn SessionRegistry> {
        &self.store
    }
}

#[allow(dead_code)]
pub fn owner(name: &str) -> OwnerId {
    OwnerId::new(name).unwrap()
}

/// Create a session owned by `alice`.
#[allow(dead_code)]
pub async fn open_session(store: &Arc<dyn SessionRegistry>) -> SessionId {
    let id = SessionId::new();
    store.get_or_create_session(id, &owner("alice")).await.unwrap();
    id
}
