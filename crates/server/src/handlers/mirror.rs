//! Network-mirror protocol adapter and cache engine.
//!
//! Three request shapes share the fourth path segment under the configured
//! prefix: `index.json` (version listing), `<version>.json` (per-version
//! archive manifest with relative URLs), and
//! `terraform-provider-<p>_<v>_<os>_<arch>.zip` (the binary itself, served
//! through the cache). Every identifier is validated before any store or
//! upstream I/O.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::upstream::{DownloadInfo, UpstreamError};
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tfmirror_core::provider::{
    self, ProviderArchive, archive_filename, parse_archive_filename,
};
use tfmirror_core::Sha256Digest;
use tfmirror_storage::Object;

/// Version documents look like `3.7.2.json` (pre-release suffix allowed);
/// the `.json` suffix is stripped before matching.
static VERSION_DOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+(?:-[\w-]+)?$").unwrap());

/// Protocol-defined empty object used as the value in the index listing.
#[derive(Debug, Serialize)]
pub struct Empty {}

/// Response for `index.json`.
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub versions: BTreeMap<String, Empty>,
}

/// One downloadable archive, addressed relative to the request URL.
#[derive(Debug, Serialize)]
pub struct ArchiveInfo {
    pub url: String,
}

/// Response for `<version>.json`.
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub archives: BTreeMap<String, ArchiveInfo>,
}

/// GET `<prefix>/{registry}/{namespace}/{provider}/{artifact}`.
///
/// Dispatches on the artifact segment the way the route table cannot: the
/// three protocol shapes plus a 400 for anything else.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path((registry, namespace, provider, artifact)): Path<(String, String, String, String)>,
) -> Response {
    if artifact == "index.json" {
        return provider_index(&state, &registry, &namespace, &provider)
            .await
            .into_response();
    }

    let version = artifact.strip_suffix(".json").unwrap_or(&artifact);
    if VERSION_DOC_RE.is_match(version) {
        let version = version.to_string();
        return provider_version(&state, &registry, &namespace, &provider, &version)
            .await
            .into_response();
    }

    if artifact.ends_with(".zip") {
        return download_provider(&state, registry, namespace, provider, &artifact)
            .await
            .into_response();
    }

    ApiError::bad_request("unsupported request").into_response()
}

/// Map an upstream failure to the wire error contract: transport and non-2xx
/// are 502 (echoing the upstream status when one was received); a malformed
/// payload from a reachable upstream is 500.
fn upstream_error(
    fetch_message: &'static str,
    parse_message: &'static str,
    err: UpstreamError,
) -> ApiError {
    match err {
        UpstreamError::Status { status, body } => {
            tracing::error!(status = %status, body = %body, "unexpected response from registry");
            ApiError::BadGateway {
                message: fetch_message.to_string(),
                status: Some(status.to_string()),
            }
        }
        UpstreamError::Transport(e) => {
            tracing::error!(error = %e, "upstream request failed");
            ApiError::BadGateway {
                message: fetch_message.to_string(),
                status: None,
            }
        }
        UpstreamError::Decode(e) => {
            tracing::error!(error = %e, "failed to parse upstream response");
            ApiError::internal(parse_message)
        }
    }
}

/// `index.json`: the upstream version list reshaped into the mirror protocol
/// `{"versions":{"x":{},...}}` form.
async fn provider_index(
    state: &AppState,
    registry: &str,
    namespace: &str,
    provider: &str,
) -> ApiResult<Json<IndexResponse>> {
    tracing::info!(
        registry = %registry,
        namespace = %namespace,
        provider = %provider,
        "provider index requested"
    );

    if !provider::is_valid_registry(registry)
        || !provider::is_valid_namespace(namespace)
        || !provider::is_valid_provider(provider)
    {
        return Err(ApiError::bad_request("invalid parameters"));
    }

    let response = state
        .upstream
        .list_versions(registry, namespace, provider)
        .await
        .map_err(|e| upstream_error(
            "failed to fetch provider versions",
            "failed to parse provider versions",
            e,
        ))?;

    let versions = response
        .versions
        .into_iter()
        .map(|v| (v.version, Empty {}))
        .collect();

    Ok(Json(IndexResponse { versions }))
}

/// `<version>.json`: archive manifest for one version. URLs are relative;
/// the client resolves them against the request URL.
async fn provider_version(
    state: &AppState,
    registry: &str,
    namespace: &str,
    provider: &str,
    version: &str,
) -> ApiResult<Json<VersionResponse>> {
    if !provider::is_valid_registry(registry)
        || !provider::is_valid_namespace(namespace)
        || !provider::is_valid_provider(provider)
        || !provider::is_valid_version(version)
    {
        return Err(ApiError::bad_request("invalid parameters"));
    }

    tracing::info!(
        registry = %registry,
        namespace = %namespace,
        provider = %provider,
        version = %version,
        "fetching provider version details"
    );

    let response = state
        .upstream
        .list_versions(registry, namespace, provider)
        .await
        .map_err(|e| upstream_error(
            "failed to fetch provider versions",
            "failed to parse provider versions",
            e,
        ))?;

    let entry = response
        .versions
        .iter()
        .find(|v| v.version == version)
        .ok_or_else(|| {
            tracing::warn!(version = %version, "version not found");
            ApiError::NotFound("version not found".to_string())
        })?;

    let archives = entry
        .platforms
        .iter()
        .map(|platform| {
            (
                format!("{}_{}", platform.os, platform.arch),
                ArchiveInfo {
                    url: archive_filename(provider, version, &platform.os, &platform.arch),
                },
            )
        })
        .collect();

    Ok(Json(VersionResponse { archives }))
}

/// The binary-serving path: cache hit streams from the store, cache miss runs
/// the single-flight install pipeline.
async fn download_provider(
    state: &AppState,
    registry: String,
    namespace: String,
    provider: String,
    filename: &str,
) -> ApiResult<Response> {
    let parsed = parse_archive_filename(filename)
        .map_err(|_| ApiError::bad_request(format!("invalid file format: {filename}")))?;

    // The filename embeds a provider name; it must agree with the path.
    if parsed.provider != provider {
        return Err(ApiError::bad_request(
            "provider name in filename does not match request path",
        ));
    }

    let archive = ProviderArchive {
        registry,
        namespace,
        provider,
        version: parsed.version,
        os: parsed.os,
        arch: parsed.arch,
    };
    archive
        .validate()
        .map_err(|_| ApiError::bad_request("invalid parameters"))?;

    let key = archive.cache_key();
    tracing::debug!(key = %key, "attempting to get archive from cache");

    match state.storage.get(&key).await {
        Ok(object) => {
            tracing::info!(key = %key, "serving from cache");
            Ok(serve_object(object, &archive.filename()))
        }
        Err(e) if e.is_not_found() => install_and_serve(state, &archive, &key).await,
        Err(e) => Err(e.into()),
    }
}

/// Install path. Holds the install lock across re-check, download, digest
/// verification, and publish, so concurrent misses for one key produce a
/// single upstream download.
async fn install_and_serve(
    state: &AppState,
    archive: &ProviderArchive,
    key: &str,
) -> ApiResult<Response> {
    tracing::info!(key = %key, "archive not found in cache, downloading");

    let _guard = state.install_lock.lock().await;

    // Another worker may have finished the install while we waited.
    if state.storage.exists(key).await? {
        let object = state.storage.get(key).await?;
        return Ok(serve_object(object, &archive.filename()));
    }

    let info = state
        .upstream
        .download_info(
            &archive.registry,
            &archive.namespace,
            &archive.provider,
            &archive.version,
            &archive.os,
            &archive.arch,
        )
        .await
        .map_err(|e| upstream_error(
            "failed to fetch download info",
            "failed to parse download info",
            e,
        ))?;

    if info.download_url.is_empty() || info.shasum.is_empty() {
        tracing::error!("missing download URL or SHA256 checksum in upstream response");
        return Err(ApiError::internal("invalid download information"));
    }

    tracing::info!(
        download_url = %info.download_url,
        sha256 = %info.shasum,
        "downloading provider binary"
    );

    let data = fetch_and_verify(state, &info).await.map_err(|details| {
        tracing::error!(error = %details, "failed to download or verify provider binary");
        ApiError::Internal {
            message: "failed to download or verify provider binary".to_string(),
            details: Some(details),
        }
    })?;

    state.storage.put(key, data.clone()).await?;
    tracing::info!(key = %key, sha256 = %info.shasum, "successfully downloaded and verified provider binary");

    // The published entry is exactly these verified bytes; serve them without
    // a second counting store read.
    Ok(serve_bytes(data, &archive.filename()))
}

/// Fetch the archive body and verify it against the upstream-reported digest.
/// Nothing is published on any failure.
async fn fetch_and_verify(state: &AppState, info: &DownloadInfo) -> Result<Bytes, String> {
    let expected = Sha256Digest::from_hex(&info.shasum)
        .map_err(|e| format!("invalid upstream checksum: {e}"))?;

    let data = state
        .upstream
        .fetch_archive(&info.download_url)
        .await
        .map_err(|e| e.to_string())?;

    expected.verify(&data).map_err(|e| e.to_string())?;
    Ok(data)
}

/// Stream a cached entry to the client.
fn serve_object(object: Object, filename: &str) -> Response {
    let stream = object.stream.map(|result| {
        result.map_err(|e| {
            tracing::error!(error = %e, "error reading archive from storage");
            std::io::Error::other(e.to_string())
        })
    });
    let body = Body::from_stream(stream);
    archive_response(body, object.size, filename)
}

/// Serve freshly verified bytes.
fn serve_bytes(data: Bytes, filename: &str) -> Response {
    let size = data.len() as u64;
    archive_response(Body::from(data), Some(size), filename)
}

fn archive_response(body: Body, size: Option<u64>, filename: &str) -> Response {
    let disposition = format!("attachment; filename={filename}");
    match size {
        Some(size) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "application/zip".to_string()),
                (CONTENT_DISPOSITION, disposition),
                (CONTENT_LENGTH, size.to_string()),
            ],
            body,
        )
            .into_response(),
        None => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "application/zip".to_string()),
                (CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response(),
    }
}
