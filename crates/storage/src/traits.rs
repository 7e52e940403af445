//! Storage trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A readable cache entry: the byte stream plus the entry size when the
/// backend knows it (used for `Content-Length`).
pub struct Object {
    pub stream: ByteStream,
    pub size: Option<u64>,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object").field("size", &self.size).finish()
    }
}

/// Object store abstraction over the cached provider archives.
///
/// Keys are `/`-separated paths derived from provider identity; backends must
/// never let a key escape their root. `get` distinguishes a miss
/// ([`crate::StorageError::NotFound`]) from a failure so callers can trigger
/// the install path.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Retrieve an entry by key.
    async fn get(&self, key: &str) -> StorageResult<Object>;

    /// Install bytes under `key`, atomically.
    ///
    /// Concurrent callers for the same key are serialized; if the key already
    /// exists the call is a no-op and returns success.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Side-effect-free presence check.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove every entry whose key starts with `prefix` at a segment
    /// boundary (or equals it). Returns the number of entries removed; a
    /// non-existent prefix removes nothing and returns 0.
    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<u64>;

    /// Static identifier for the backend type, used in logs.
    fn backend_name(&self) -> &'static str;
}
