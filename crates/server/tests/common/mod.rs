//! Common test utilities.
//!
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tfmirror_core::Config;
use tfmirror_server::{AppState, RegistryClient, create_router};
use tfmirror_storage::{FilesystemStore, MetricsStorage, Storage};
use tower::ServiceExt;

/// A test server wired to a mock upstream registry and a temp-dir store.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    pub upstream: httpmock::MockServer,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let storage_path = temp_dir.path().join("cache");

        tfmirror_storage::metrics::register_metrics();

        let inner: Arc<dyn Storage> = Arc::new(
            FilesystemStore::new(&storage_path)
                .await
                .expect("failed to create storage backend"),
        );
        let storage: Arc<dyn Storage> = Arc::new(MetricsStorage::new(inner));

        let upstream = httpmock::MockServer::start_async().await;

        let config = Config {
            cache_dir: storage_path,
            ..Default::default()
        };

        // The mock registry speaks plain HTTP.
        let client = RegistryClient::insecure().expect("failed to build upstream client");
        let state = AppState::new(config, storage, Arc::new(client));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            upstream,
            _temp_dir: temp_dir,
        }
    }

    /// Registry identifier that routes requests to the mock upstream.
    pub fn registry(&self) -> String {
        format!("127.0.0.1:{}", self.upstream.port())
    }

    /// Absolute URL on the mock upstream.
    pub fn upstream_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.upstream.port(), path)
    }
}

/// Send a request with an empty body and decode the JSON response.
#[allow(dead_code)]
pub async fn request_json(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Send a GET and return status, headers, and raw body bytes.
#[allow(dead_code)]
pub async fn get_raw(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, headers, body)
}
