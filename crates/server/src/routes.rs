//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload write path
        .route("/v1/uploads/{session_id}", get(handlers::get_upload))
        .route(
            "/v1/uploads/{session_id}/chunks/{index}",
            put(handlers::upload_chunk),
        )
        // Read path (GET also answers HEAD)
        .route(
            "/v1/reels/{session_id}/stream",
            get(handlers::stream_artifact),
        );

    let mut router = Router::new().merge(api_routes);

    // SECURITY: when enabled, network-restrict this endpoint to scrapers.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
