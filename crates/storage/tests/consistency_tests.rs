//! Cross-operation consistency tests for the filesystem backend, driven
//! through the `Storage` trait object the way the server holds it.

use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use tfmirror_storage::{FilesystemStore, MetricsStorage, Storage};

async fn store() -> (tempfile::TempDir, Arc<dyn Storage>) {
    let dir = tempfile::tempdir().unwrap();
    let inner: Arc<dyn Storage> = Arc::new(FilesystemStore::new(dir.path()).await.unwrap());
    (dir, Arc::new(MetricsStorage::new(inner)))
}

async fn read_all(store: &Arc<dyn Storage>, key: &str) -> Vec<u8> {
    let object = store.get(key).await.unwrap();
    let chunks: Vec<Bytes> = object.stream.try_collect().await.unwrap();
    chunks.concat()
}

#[tokio::test]
async fn readers_see_prior_state_or_full_entry() {
    let (_dir, store) = store().await;
    let key = "registry.terraform.io/hashicorp/random/3.7.2/terraform-provider-random_3.7.2_linux_amd64.zip";

    assert!(!store.exists(key).await.unwrap());
    assert!(store.get(key).await.unwrap_err().is_not_found());

    let payload = vec![0xabu8; 256 * 1024];
    store.put(key, Bytes::from(payload.clone())).await.unwrap();

    assert!(store.exists(key).await.unwrap());
    assert_eq!(read_all(&store, key).await, payload);
}

#[tokio::test]
async fn concurrent_readers_during_install_never_see_partial_bytes() {
    let (_dir, store) = store().await;
    let key = "reg/ns/p/1.0.0/archive.zip";
    let payload = Bytes::from(vec![0x5au8; 1024 * 1024]);

    let writer = {
        let store = store.clone();
        let payload = payload.clone();
        tokio::spawn(async move { store.put(key, payload).await })
    };

    // Race readers against the install; each must observe either a miss or
    // the complete entry, never a short read.
    let mut readers = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let expected_len = payload.len();
        readers.push(tokio::spawn(async move {
            match store.get(key).await {
                Ok(object) => {
                    let chunks: Vec<Bytes> = object.stream.try_collect().await.unwrap();
                    assert_eq!(chunks.concat().len(), expected_len);
                }
                Err(e) => assert!(e.is_not_found()),
            }
        }));
    }

    writer.await.unwrap().unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(read_all(&store, key).await.len(), payload.len());
}

#[tokio::test]
async fn hierarchical_invalidation_spares_siblings() {
    let (_dir, store) = store().await;

    let keys = [
        "reg/hashicorp/random/3.7.1/a.zip",
        "reg/hashicorp/random/3.7.2/b.zip",
        "reg/hashicorp/null/3.2.0/c.zip",
        "reg/other/random/3.7.2/d.zip",
    ];
    for key in keys {
        store.put(key, Bytes::from_static(b"zip")).await.unwrap();
    }

    assert_eq!(store.delete_by_prefix("reg/hashicorp/random").await.unwrap(), 2);

    assert!(!store.exists(keys[0]).await.unwrap());
    assert!(!store.exists(keys[1]).await.unwrap());
    assert!(store.exists(keys[2]).await.unwrap());
    assert!(store.exists(keys[3]).await.unwrap());

    assert_eq!(store.delete_by_prefix("reg").await.unwrap(), 2);
    assert_eq!(store.delete_by_prefix("reg").await.unwrap(), 0);
}
