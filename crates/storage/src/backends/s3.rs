//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::metrics::CacheMetrics;
use crate::traits::{Object, Storage};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use futures::StreamExt;
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// S3 DeleteObjects accepts at most 1000 keys per request.
const DELETE_BATCH_SIZE: usize = 1000;

/// Maximum retry attempts per S3 request.
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// S3-compatible object store.
pub struct S3Store {
    client: Client,
    bucket: String,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

fn map_s3_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// Whether an SDK error is a 404 from the service.
fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool {
    if let aws_sdk_s3::error::SdkError::ServiceError(service_err) = err {
        return service_err.raw().status().as_u16() == 404;
    }
    false
}

impl S3Store {
    /// Create a new S3 store.
    ///
    /// Credentials and endpoint come from the ambient AWS configuration;
    /// `role_arn` wraps them through an AssumeRole provider when set.
    pub async fn new(
        bucket: &str,
        region: &str,
        role_arn: Option<String>,
    ) -> StorageResult<Self> {
        if bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket cannot be empty".to_string()));
        }

        let region = Region::new(region.to_string());
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_RETRY_ATTEMPTS));

        if let Some(role_arn) = role_arn {
            let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .region(region)
                .session_name("tfmirror")
                .build()
                .await;
            loader = loader.credentials_provider(provider);
        }

        let shared_config = loader.load().await;
        Ok(Self {
            client: Client::new(&shared_config),
            bucket: bucket.to_string(),
            metrics: CacheMetrics::new(),
        })
    }
}

#[async_trait]
impl Storage for S3Store {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Object> {
        let start = Instant::now();

        if !self.exists(key).await? {
            self.metrics.record_miss();
            tracing::debug!(key, "cache miss: object not found in S3");
            return Err(StorageError::NotFound(key.to_string()));
        }

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                self.metrics.record_error("get");
                tracing::error!(key, error = %e, "failed to get object from S3");
                map_s3_error(e)
            })?;

        let size = output.content_length().and_then(|len| u64::try_from(len).ok());
        self.metrics.record_hit();
        if let Some(size) = size {
            self.metrics.update_size(size as i64);
        }
        self.metrics
            .observe_duration("get", start.elapsed().as_secs_f64());
        tracing::debug!(key, "cache hit: object found in S3");

        let reader = ReaderStream::new(output.body.into_async_read());
        let stream = reader.map(|result| result.map_err(StorageError::Io));

        Ok(Object {
            stream: Box::pin(stream),
            size,
        })
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let start = Instant::now();

        // If the object is being replaced, retract its previous size from the
        // gauge before the upload lands.
        if self.exists(key).await? {
            let head = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await;
            if let Ok(head) = head {
                if let Some(len) = head.content_length() {
                    self.metrics.update_size(-len);
                }
            }
        }

        let size = data.len() as i64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.into())
            .send()
            .await
            .map_err(|e| {
                self.metrics.record_error("put");
                tracing::error!(key, error = %e, "failed to upload object to S3");
                map_s3_error(e)
            })?;

        self.metrics.update_size(size);
        self.metrics
            .observe_duration("put", start.elapsed().as_secs_f64());
        tracing::info!(key, "uploaded object to S3");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => {
                self.metrics.record_error("exists");
                Err(map_s3_error(err))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let start = Instant::now();
        tracing::info!(prefix, "deleting objects by prefix");

        // List everything under the prefix first, accumulating sizes for the
        // gauge.
        let mut object_ids = Vec::new();
        let mut total_size = 0i64;
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| {
                self.metrics.record_error("delete_by_prefix");
                map_s3_error(e)
            })?;

            for obj in output.contents() {
                if let Some(obj_key) = obj.key() {
                    let id = ObjectIdentifier::builder()
                        .key(obj_key)
                        .build()
                        .map_err(|e| StorageError::S3(Box::new(e)))?;
                    object_ids.push(id);
                    total_size += obj.size().unwrap_or(0).max(0);
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        if object_ids.is_empty() {
            tracing::info!(prefix, "no objects found with prefix");
            return Ok(0);
        }

        let mut deleted = 0u64;
        for batch in object_ids.chunks(DELETE_BATCH_SIZE) {
            let delete = Delete::builder()
                .set_objects(Some(batch.to_vec()))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    self.metrics.record_error("delete_by_prefix");
                    tracing::error!(
                        prefix,
                        deleted,
                        error = %e,
                        "batch delete failed partway through prefix"
                    );
                    map_s3_error(e)
                })?;

            deleted += batch.len() as u64;
        }

        if total_size > 0 {
            self.metrics.update_size(-total_size);
        }
        self.metrics.record_deletion(deleted);
        self.metrics
            .observe_duration("delete_by_prefix", start.elapsed().as_secs_f64());
        tracing::info!(prefix, count = deleted, bytes = total_size, "deleted objects by prefix");
        Ok(deleted)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_rejects_empty_bucket() {
        let err = S3Store::new("", "eu-central-1", None).await.unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn new_constructs_with_region() {
        let store = S3Store::new("mirror-cache", "eu-central-1", None)
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "s3");
        assert_eq!(store.bucket, "mirror-cache");
    }
}
