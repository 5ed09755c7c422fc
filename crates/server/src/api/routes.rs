use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, remove_bg};
use crate::state::AppState;

/// Room for multipart boundaries, headers and the small text fields on top of
/// the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .upload()
        .max_file_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        // Background removal
        .route(
            "/remove-bg",
            post(remove_bg::remove_background).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Health and observability
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
