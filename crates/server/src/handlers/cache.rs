//! Cache invalidation surface.
//!
//! `DELETE <prefix>/registry[/namespace[/provider[/version[/file]]]]` removes
//! every cached archive under the prefix formed by the present segments.

use crate::error::ErrorResponse;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Success body for cache invalidation.
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub message: &'static str,
    pub deleted: u64,
}

pub async fn delete_registry(
    State(state): State<AppState>,
    Path(registry): Path<String>,
) -> Response {
    clear_prefix(&state, &[registry]).await
}

pub async fn delete_namespace(
    State(state): State<AppState>,
    Path((registry, namespace)): Path<(String, String)>,
) -> Response {
    clear_prefix(&state, &[registry, namespace]).await
}

pub async fn delete_provider(
    State(state): State<AppState>,
    Path((registry, namespace, provider)): Path<(String, String, String)>,
) -> Response {
    clear_prefix(&state, &[registry, namespace, provider]).await
}

pub async fn delete_version(
    State(state): State<AppState>,
    Path((registry, namespace, provider, version)): Path<(String, String, String, String)>,
) -> Response {
    clear_prefix(&state, &[registry, namespace, provider, version]).await
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((registry, namespace, provider, version, file)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Response {
    clear_prefix(&state, &[registry, namespace, provider, version, file]).await
}

async fn clear_prefix(state: &AppState, segments: &[String]) -> Response {
    let prefix = segments.join("/");
    tracing::info!(prefix = %prefix, "deleting cache by prefix");

    match state.storage.delete_by_prefix(&prefix).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(ClearCacheResponse {
                message: "Cache cleared successfully",
                deleted,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(prefix = %prefix, error = %e, "failed to delete cache");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to delete cache: {e}"),
                    status: None,
                    details: None,
                }),
            )
                .into_response()
        }
    }
}
