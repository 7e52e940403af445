//! Upstream provider-registry client.
//!
//! Speaks the registry protocol at `https://<registry>/v1/providers/...`:
//! version listings and per-platform download descriptors, plus the archive
//! transfer itself. The JSON schemas are consumed exactly as the registry
//! publishes them; unknown fields are ignored and absent ones defaulted.

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// User agent presented to upstream registries.
const USER_AGENT: &str = "Terraform/1.0.0";

/// Timeout for registry JSON calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the archive body transfer.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Response from the registry versions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionsResponse {
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// One published version with its supported platforms.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

/// Signed-download descriptor from the registry download endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadInfo {
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub shasum: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

/// Upstream call errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected upstream status {status}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Client for the upstream provider registry.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    scheme: &'static str,
}

impl RegistryClient {
    /// Client that reaches registries over HTTPS.
    pub fn new() -> reqwest::Result<Self> {
        Self::with_scheme("https")
    }

    /// Client that reaches registries over plain HTTP, for registries that do
    /// not terminate TLS (local mirrors, test registries).
    pub fn insecure() -> reqwest::Result<Self> {
        Self::with_scheme("http")
    }

    fn with_scheme(scheme: &'static str) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, scheme })
    }

    fn base_url(&self, registry: &str) -> String {
        format!("{}://{}", self.scheme, registry)
    }

    /// Read the response body as JSON after checking the status.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(UpstreamError::Status { status, body });
        }
        serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Fetch the list of published versions for a provider.
    pub async fn list_versions(
        &self,
        registry: &str,
        namespace: &str,
        provider: &str,
    ) -> Result<VersionsResponse, UpstreamError> {
        let url = format!(
            "{}/v1/providers/{}/{}/versions",
            self.base_url(registry),
            namespace,
            provider
        );
        tracing::debug!(url, "fetching provider versions from registry");

        let response = self.http.get(&url).send().await?;
        Self::decode(response).await
    }

    /// Fetch the download descriptor for a specific release and platform.
    pub async fn download_info(
        &self,
        registry: &str,
        namespace: &str,
        provider: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<DownloadInfo, UpstreamError> {
        let url = format!(
            "{}/v1/providers/{}/{}/{}/download/{}/{}",
            self.base_url(registry),
            namespace,
            provider,
            version,
            os,
            arch
        );
        tracing::debug!(url, "fetching download info from upstream");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Download an archive body. The transfer may run up to five minutes.
    pub async fn fetch_archive(&self, url: &str) -> Result<Bytes, UpstreamError> {
        tracing::debug!(url, "downloading provider archive");

        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        Ok(response.bytes().await?)
    }
}
