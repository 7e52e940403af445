//! Object storage for the tfmirror provider cache.
//!
//! This crate provides:
//! - The [`Storage`] contract the mirror serves archives through
//! - Backends: local filesystem and S3-compatible
//! - The transparent metrics decorator
//! - The Prometheus cache metrics both backends feed

pub mod backends;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod wrapper;

pub use backends::{filesystem::FilesystemStore, s3::S3Store};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, Object, Storage};
pub use wrapper::MetricsStorage;

use std::sync::Arc;
use tfmirror_core::{Config, StorageType};

/// Create a store from configuration.
pub async fn from_config(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_type {
        StorageType::Local => {
            let store = FilesystemStore::new(&config.cache_dir).await?;
            Ok(Arc::new(store))
        }
        StorageType::S3 => {
            let bucket = config
                .s3_bucket
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    StorageError::Config("S3_BUCKET is required when using S3 storage".to_string())
                })?;
            let store = S3Store::new(bucket, &config.s3_region, config.s3_role_arn.clone()).await?;
            Ok(Arc::new(store))
        }
    }
}
