//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

/// Create the application router.
///
/// The mirror protocol and the invalidation surface live under the configured
/// URI prefix; `/health` and the 404 fallback sit at the root.
pub fn create_router(state: AppState) -> Router {
    let mirror = Router::new()
        .route("/{registry}", delete(handlers::cache::delete_registry))
        .route(
            "/{registry}/{namespace}",
            delete(handlers::cache::delete_namespace),
        )
        .route(
            "/{registry}/{namespace}/{provider}",
            delete(handlers::cache::delete_provider),
        )
        .route(
            "/{registry}/{namespace}/{provider}/{artifact}",
            get(handlers::mirror::get_artifact).delete(handlers::cache::delete_version),
        )
        .route(
            "/{registry}/{namespace}/{provider}/{artifact}/{file}",
            delete(handlers::cache::delete_file),
        );

    let router = Router::new().route("/health", get(health));

    let prefix = state.config.uri_prefix.trim_end_matches('/').to_string();
    let router = if prefix.is_empty() {
        router.merge(mirror)
    } else {
        router.nest(&prefix, mirror)
    };

    router
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness probe.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Fallback for unknown routes.
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found" })),
    )
}
