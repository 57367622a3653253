//! Router assembly

use crate::handlers::{self, AppState};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Addon-protocol surface: manifest, streams, health.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/manifest.json", get(handlers::manifest))
        .route("/health", get(handlers::health))
        .route("/stream/:type/:id", get(handlers::streams))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
