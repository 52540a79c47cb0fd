//! HTTP API server for Reel.
//!
//! This crate is a thin adapter over `reel-assembly`:
//! - Chunk submission
//! - Session status
//! - Artifact streaming with byte ranges
//! - Health and Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
