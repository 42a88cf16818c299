//! In-memory storage implementation for the key-value backend.
//!
//! Entries live in per-bucket B-trees behind an async-safe read-write lock, so prefix scans
//! are range scans and come out in lexical path order.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;

use docbase_core::{
    backend::{KvBackend, KvBackendBuilder, KvEntry, KvStream},
    error::ContentResult,
};

type BucketMap = BTreeMap<String, Vec<u8>>;
type StoreMap = HashMap<String, BucketMap>;

/// Thread-safe in-memory key-value backend.
///
/// This struct implements the [`KvBackend`] trait entirely in memory using async-aware
/// read-write locks. Readers never block each other; a `put` replaces the stored bytes in one
/// step under the write lock.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use docbase_memory::InMemoryStore;
/// use docbase::backend::KvBackend;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.put("main~docs", "intro.md", b"{}".to_vec()).await?;
///     assert_eq!(store.get("main~docs", "intro.md").await?, Some(b"{}".to_vec()));
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: bucket -> (relative path -> bytes)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docbase_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of entries stored in `bucket`.
    pub async fn len(&self, bucket: &str) -> usize {
        self.store
            .read()
            .await
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl KvBackend for InMemoryStore {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        let store = self.store.read().await;

        Ok(store
            .get(bucket)
            .and_then(|entries| entries.get(relative_path))
            .cloned())
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        let mut store = self.store.write().await;
        store
            .entry(bucket.to_string())
            .or_default()
            .insert(relative_path.to_string(), value);

        Ok(())
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        let mut store = self.store.write().await;

        if let Some(entries) = store.get_mut(bucket) {
            entries.remove(relative_path);
            if entries.is_empty() {
                store.remove(bucket);
            }
        }

        Ok(())
    }

    /// Snapshots the matching range when first polled; later writes do not affect the stream.
    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();

        stream::once(async move {
            let store = self.store.read().await;
            let snapshot = store
                .get(&bucket)
                .map(|entries| {
                    entries
                        .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                        .take_while(|(path, _)| path.starts_with(&prefix))
                        .map(|(path, value)| {
                            Ok(KvEntry {
                                relative_path: path.clone(),
                                value: value.clone(),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            stream::iter(snapshot)
        })
        .flatten()
        .boxed()
    }
}

/// Builder for [`InMemoryStore`].
///
/// Building always succeeds and returns a fresh, empty store.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl KvBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> ContentResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn paths(store: &InMemoryStore, bucket: &str, prefix: &str) -> Vec<String> {
        store
            .iterate(bucket, prefix)
            .map_ok(|entry| entry.relative_path)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::builder().build().await.unwrap();

        assert_eq!(store.get("b", "k").await.unwrap(), None);
        store.put("b", "k", vec![1]).await.unwrap();
        store.put("b", "k", vec![2]).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), Some(vec![2]));

        store.delete("b", "k").await.unwrap();
        store.delete("b", "k").await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), None);
        assert_eq!(store.len("b").await, 0);
    }

    #[tokio::test]
    async fn buckets_are_separate() {
        let store = InMemoryStore::new();
        store.put("main~docs", "a", vec![1]).await.unwrap();

        assert_eq!(store.get("main~blog", "a").await.unwrap(), None);
        assert_eq!(store.get("feature~docs", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn iterates_in_byte_order_within_prefix() {
        let store = InMemoryStore::new();
        for path in ["guide/b", "guide/B", "guide/a/x", "guidebook", "api/a", "guide/a"] {
            store.put("b", path, Vec::new()).await.unwrap();
        }

        assert_eq!(
            paths(&store, "b", "guide/").await,
            vec!["guide/B", "guide/a", "guide/a/x", "guide/b"]
        );
        assert_eq!(paths(&store, "b", "").await.len(), 6);
        assert!(paths(&store, "missing", "").await.is_empty());
    }

    #[tokio::test]
    async fn iteration_is_restartable() {
        let store = InMemoryStore::new();
        store.put("b", "one", Vec::new()).await.unwrap();

        let first = paths(&store, "b", "").await;
        store.put("b", "two", Vec::new()).await.unwrap();
        let second = paths(&store, "b", "").await;

        assert_eq!(first, vec!["one"]);
        assert_eq!(second, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryStore::new();
        let clone = store.clone();

        clone.put("b", "k", vec![9]).await.unwrap();

        assert_eq!(store.get("b", "k").await.unwrap(), Some(vec![9]));
    }
}
