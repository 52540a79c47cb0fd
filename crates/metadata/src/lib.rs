//! Session registry for Reel.
//!
//! This crate owns the upload control-plane data:
//! - Upload sessions, their owner and lifecycle state
//! - The received-chunk set and expected chunk count
//! - Published artifact and failure diagnostics

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{ChunkReceipt, TransitionDetail, UploadRepo};
pub use store::{SessionRegistry, SqliteStore};

use reel_core::config::MetadataConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a session registry from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn SessionRegistry>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, Duration::from_secs(*busy_timeout_secs)).await?;
            Ok(Arc::new(store) as Arc<dyn SessionRegistry>)
        }
    }
}
