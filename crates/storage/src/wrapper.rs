//! Transparent metrics decorator.

use crate::error::StorageResult;
use crate::traits::{Object, Storage};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Pass-through wrapper around a [`Storage`] implementation.
///
/// Hit/miss/size/error accounting happens inside the backends themselves
/// (both record against the same process-wide metrics), so this wrapper only
/// delegates. It exists to keep the composition point where a recording
/// decorator would sit.
pub struct MetricsStorage {
    inner: Arc<dyn Storage>,
}

impl MetricsStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Storage for MetricsStorage {
    async fn get(&self, key: &str) -> StorageResult<Object> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<u64> {
        self.inner.delete_by_prefix(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::filesystem::FilesystemStore;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn delegates_to_inner_store() {
        let dir = tempfile::tempdir().unwrap();
        let inner: Arc<dyn Storage> =
            Arc::new(FilesystemStore::new(dir.path()).await.unwrap());
        let store = MetricsStorage::new(inner);

        assert_eq!(store.backend_name(), "filesystem");
        assert!(!store.exists("a/b").await.unwrap());

        store.put("a/b", Bytes::from_static(b"payload")).await.unwrap();
        assert!(store.exists("a/b").await.unwrap());

        let object = store.get("a/b").await.unwrap();
        let chunks: Vec<Bytes> = object.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"payload");

        assert_eq!(store.delete_by_prefix("a").await.unwrap(), 1);
        assert!(!store.exists("a/b").await.unwrap());
    }
}
