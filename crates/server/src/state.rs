//! Application state shared across handlers.

use reel_assembly::UploadService;
use reel_core::config::AppConfig;
use reel_metadata::SessionRegistry;
use reel_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Upload pipeline.
    pub uploads: Arc<UploadService>,
}

impl AppState {
    /// Wire the upload pipeline over a store and registry.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        registry: Arc<dyn SessionRegistry>,
    ) -> Self {
        let uploads = UploadService::new(storage, registry, &config.server);
        Self {
            config: Arc::new(config),
            uploads: Arc::new(uploads),
        }
    }

    /// Largest request body accepted for one chunk.
    pub fn max_chunk_size(&self) -> usize {
        usize::try_from(self.config.server.max_chunk_size).unwrap_or(usize::MAX)
    }
}
