//! Application configuration.
//!
//! Configuration comes from environment variables; the `tfmirrord` binary
//! extracts this struct with figment's `Env` provider, then calls
//! [`Config::validate`] before anything else starts.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Storage backend selection (`STORAGE_TYPE`).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Local filesystem storage rooted at `CACHE_DIR`.
    #[default]
    Local,
    /// S3-compatible storage in `S3_BUCKET`.
    S3,
}

/// Application configuration, one field per environment variable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Main listener port (`PORT`).
    #[serde(default = "default_port")]
    pub port: u32,
    /// Metrics listener port (`METRICS_PORT`).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u32,
    /// URI prefix the mirror protocol is served under (`URI_PREFIX`).
    #[serde(default = "default_uri_prefix")]
    pub uri_prefix: String,
    /// Storage backend (`STORAGE_TYPE`).
    #[serde(default)]
    pub storage_type: StorageType,
    /// Root directory for the local backend (`CACHE_DIR`).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Log level (`LOG_LEVEL`). Unknown values fall back to `info`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bucket for the S3 backend (`S3_BUCKET`).
    #[serde(default)]
    pub s3_bucket: Option<String>,
    /// Region for the S3 backend (`S3_REGION`).
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    /// Optional role to assume for S3 access (`S3_ROLE_ARN`).
    #[serde(default)]
    pub s3_role_arn: Option<String>,
}

fn default_port() -> u32 {
    8080
}

fn default_metrics_port() -> u32 {
    9100
}

fn default_uri_prefix() -> String {
    "/providers".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_s3_region() -> String {
    "eu-central-1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            metrics_port: default_metrics_port(),
            uri_prefix: default_uri_prefix(),
            storage_type: StorageType::default(),
            cache_dir: default_cache_dir(),
            log_level: default_log_level(),
            s3_bucket: None,
            s3_region: default_s3_region(),
            s3_role_arn: None,
        }
    }
}

impl Config {
    /// Validate the configuration, returning a descriptive message on the
    /// first problem found. Startup aborts on error.
    pub fn validate(&self) -> crate::Result<()> {
        if self.port < 1 || self.port > 65535 {
            return Err(crate::Error::Config(
                "invalid PORT: must be between 1 and 65535".to_string(),
            ));
        }
        if self.metrics_port < 1 || self.metrics_port > 65535 {
            return Err(crate::Error::Config(
                "invalid METRICS_PORT: must be between 1 and 65535".to_string(),
            ));
        }
        if !self.uri_prefix.starts_with('/') {
            return Err(crate::Error::Config(
                "invalid URI_PREFIX: must begin with '/'".to_string(),
            ));
        }
        if self.storage_type == StorageType::S3 {
            match &self.s3_bucket {
                Some(bucket) if !bucket.is_empty() => {}
                _ => {
                    return Err(crate::Error::Config(
                        "S3_BUCKET is required when using S3 storage".to_string(),
                    ));
                }
            }
            if self.s3_region.is_empty() {
                return Err(crate::Error::Config(
                    "S3_REGION is required when using S3 storage".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Bind address for the main listener.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port as u16))
    }

    /// Bind address for the metrics listener.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port as u16))
    }

    pub fn is_s3(&self) -> bool {
        self.storage_type == StorageType::S3
    }

    pub fn is_local(&self) -> bool {
        self.storage_type == StorageType::Local
    }
}
