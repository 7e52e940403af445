//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::metrics::CacheMetrics;
use crate::traits::{Object, Storage};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem object store rooted at a base directory.
///
/// Writes to the same key are serialized through a per-key mutex map. The map
/// is populated lazily and never shrunk; key cardinality is bounded by the
/// number of distinct provider archives, so this stays small.
pub struct FilesystemStore {
    root: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    metrics: CacheMetrics,
}

impl FilesystemStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            locks: std::sync::Mutex::new(HashMap::new()),
            metrics: CacheMetrics::new(),
        })
    }

    /// Mutex guarding writes to `key`, created on first use.
    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Resolve `root/key` with path traversal protection.
    ///
    /// Canonicalization touches the filesystem, so the check runs on the
    /// blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Reject any key whose resolved path would leave the storage root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Canonicalize the nearest existing ancestor and require it to stay
        // under the root. This also catches symlinks inside the root that
        // point outside of it.
        let mut ancestor = path.as_path();
        loop {
            match std::fs::symlink_metadata(ancestor) {
                Ok(_) => {
                    let canonical = ancestor.canonicalize().map_err(|e| {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }

        Ok(path)
    }

    /// Walk a directory tree counting files and bytes, without following
    /// symlinks.
    async fn tally_tree(path: &Path) -> StorageResult<(u64, i64)> {
        let mut count = 0u64;
        let mut bytes = 0i64;
        let mut stack = vec![path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    count += 1;
                    bytes += entry.metadata().await?.len() as i64;
                }
            }
        }
        Ok((count, bytes))
    }
}

#[async_trait]
impl Storage for FilesystemStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Object> {
        use tokio::io::AsyncReadExt;

        let start = Instant::now();
        let path = self.key_path(key).await?;

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.metrics.record_miss();
                tracing::debug!(key, "cache miss: file not found");
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                self.metrics.record_error("get");
                return Err(StorageError::Io(e));
            }
        };

        let file = fs::File::open(&path).await.map_err(|e| {
            self.metrics.record_error("get");
            StorageError::Io(e)
        })?;

        let size = metadata.len();
        self.metrics.record_hit();
        self.metrics.update_size(size as i64);
        self.metrics
            .observe_duration("get", start.elapsed().as_secs_f64());
        tracing::debug!(key, size, "cache hit");

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Object {
            stream: Box::pin(stream),
            size: Some(size),
        })
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let start = Instant::now();
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let path = self.key_path(key).await?;

        // Entries are immutable after publish; a key that already exists is
        // not rewritten.
        if fs::try_exists(&path).await? {
            tracing::debug!(key, "entry already exists, skipping write");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename into place
        // so readers see either nothing or the complete entry.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );

        let write_result: StorageResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path).await;
            self.metrics.record_error("put");
            tracing::error!(key, error = %e, "failed to write cache entry");
            return Err(e);
        }

        self.metrics.update_size(data.len() as i64);
        self.metrics
            .observe_duration("put", start.elapsed().as_secs_f64());
        tracing::debug!(key, size = data.len(), "stored cache entry");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let start = Instant::now();
        let path = self.key_path(prefix).await?;

        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(prefix, "prefix does not exist, nothing to delete");
                return Ok(0);
            }
            Err(e) => {
                self.metrics.record_error("delete_by_prefix");
                return Err(StorageError::Io(e));
            }
        };

        // A prefix that resolves to a file deletes exactly that entry.
        if !metadata.is_dir() {
            fs::remove_file(&path).await.map_err(|e| {
                self.metrics.record_error("delete_by_prefix");
                StorageError::Io(e)
            })?;
            self.metrics.update_size(-(metadata.len() as i64));
            self.metrics.record_deletion(1);
            self.metrics
                .observe_duration("delete_by_prefix", start.elapsed().as_secs_f64());
            tracing::info!(prefix, count = 1, "deleted cache entry");
            return Ok(1);
        }

        let (count, bytes) = Self::tally_tree(&path).await.map_err(|e| {
            self.metrics.record_error("delete_by_prefix");
            e
        })?;

        fs::remove_dir_all(&path).await.map_err(|e| {
            self.metrics.record_error("delete_by_prefix");
            StorageError::Io(e)
        })?;

        self.metrics.update_size(-bytes);
        self.metrics.record_deletion(count);
        self.metrics
            .observe_duration("delete_by_prefix", start.elapsed().as_secs_f64());
        tracing::info!(prefix, count, bytes, "deleted cache entries by prefix");
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn read_object(object: Object) -> Vec<u8> {
        let chunks: Vec<Bytes> = object.stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        let key = "registry.terraform.io/hashicorp/random/3.7.2/archive.zip";
        store.put(key, Bytes::from_static(b"zip bytes")).await.unwrap();

        assert!(store.exists(key).await.unwrap());
        let object = store.get(key).await.unwrap();
        assert_eq!(object.size, Some(9));
        assert_eq!(read_object(object).await, b"zip bytes");
    }

    #[tokio::test]
    async fn get_miss_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        let err = store.get("no/such/key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn put_is_idempotent_for_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        store.put("k/v", Bytes::from_static(b"first")).await.unwrap();
        store.put("k/v", Bytes::from_static(b"second")).await.unwrap();

        let object = store.get("k/v").await.unwrap();
        assert_eq!(read_object(object).await, b"first");
    }

    #[tokio::test]
    async fn concurrent_puts_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FilesystemStore::new(dir.path()).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0u8..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put("same/key", Bytes::from(vec![i])).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let object = store.get("same/key").await.unwrap();
        assert_eq!(read_object(object).await.len(), 1);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        store.put("a/b/c.zip", Bytes::from_static(b"data")).await.unwrap();

        let parent = dir.path().join("a/b");
        let entries: Vec<_> = std::fs::read_dir(&parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["c.zip".to_string()]);
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        for key in ["../escape", "/absolute/path", "foo/../bar", "foo/../../etc/passwd"] {
            assert!(store.get(key).await.is_err(), "get should reject {key}");
            assert!(
                store.put(key, Bytes::from_static(b"x")).await.is_err(),
                "put should reject {key}"
            );
            assert!(store.exists(key).await.is_err(), "exists should reject {key}");
            assert!(
                store.delete_by_prefix(key).await.is_err(),
                "delete_by_prefix should reject {key}"
            );
        }

        // Nothing escaped the root
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = store
            .put("link/nested/file.zip", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!outside.path().join("nested").exists());
    }

    #[tokio::test]
    async fn delete_by_prefix_file_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        store.put("reg/ns/p/1.0.0/a.zip", Bytes::from_static(b"a")).await.unwrap();
        store.put("reg/ns/p/1.0.1/b.zip", Bytes::from_static(b"b")).await.unwrap();
        store.put("reg/ns/other/1.0.0/c.zip", Bytes::from_static(b"c")).await.unwrap();

        // Single file
        assert_eq!(store.delete_by_prefix("reg/ns/p/1.0.0/a.zip").await.unwrap(), 1);
        // Remaining subtree
        assert_eq!(store.delete_by_prefix("reg/ns/p").await.unwrap(), 1);
        // Sibling untouched
        assert!(store.exists("reg/ns/other/1.0.0/c.zip").await.unwrap());
        // Missing prefix
        assert_eq!(store.delete_by_prefix("reg/ns/p").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn crash_mid_install_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        // Simulate an aborted install: a stray temp file next to the target.
        let parent = dir.path().join("reg/ns/p/1.0.0");
        std::fs::create_dir_all(&parent).unwrap();
        std::fs::write(parent.join("a.zip.tmp.deadbeef"), b"partial").unwrap();

        assert!(!store.exists("reg/ns/p/1.0.0/a.zip").await.unwrap());
        assert!(store.get("reg/ns/p/1.0.0/a.zip").await.unwrap_err().is_not_found());
    }
}
