//! Backends used by the core unit tests.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;

use crate::{
    backend::{KvBackend, KvEntry, KvStream},
    error::{ContentError, ContentResult},
};

/// Ordered in-process backend; clones share state.
#[derive(Debug, Clone, Default)]
pub(crate) struct MapBackend {
    entries: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
    puts: Arc<AtomicUsize>,
}

impl MapBackend {
    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) async fn raw(&self, bucket: &str, relative_path: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(&(bucket.to_string(), relative_path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl KvBackend for MapBackend {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        Ok(self.raw(bucket, relative_path).await)
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        // Yield so concurrent writers get a chance to interleave.
        tokio::task::yield_now().await;
        self.entries
            .write()
            .await
            .insert((bucket.to_string(), relative_path.to_string()), value);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        self.entries
            .write()
            .await
            .remove(&(bucket.to_string(), relative_path.to_string()));
        Ok(())
    }

    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();

        stream::once(async move {
            let entries = self.entries.read().await;
            let matching = entries
                .iter()
                .filter(|((b, path), _)| *b == bucket && path.starts_with(&prefix))
                .map(|((_, path), value)| {
                    Ok(KvEntry {
                        relative_path: path.clone(),
                        value: value.clone(),
                    })
                })
                .collect::<Vec<_>>();
            stream::iter(matching)
        })
        .flatten()
        .boxed()
    }
}

/// Backend whose every operation fails as if the server were unreachable.
#[derive(Debug, Clone, Default)]
pub(crate) struct DownBackend;

fn down<T>() -> ContentResult<T> {
    Err(ContentError::BackendUnavailable("connection refused".to_string()))
}

#[async_trait]
impl KvBackend for DownBackend {
    async fn get(&self, _bucket: &str, _relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        down()
    }

    async fn put(&self, _bucket: &str, _relative_path: &str, _value: Vec<u8>) -> ContentResult<()> {
        down()
    }

    async fn delete(&self, _bucket: &str, _relative_path: &str) -> ContentResult<()> {
        down()
    }

    fn iterate<'a>(&'a self, _bucket: &str, _prefix: &str) -> KvStream<'a> {
        stream::once(async { down() }).boxed()
    }
}
