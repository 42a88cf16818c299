//! Key-value backend abstraction for the content database.
//!
//! This module defines the traits that abstract over storage implementations, allowing the
//! document store to run unchanged on an in-process store or on a networked key-value store.
//!
//! # Overview
//!
//! The [`KvBackend`] trait is a small, uniform byte-oriented contract: `get`, `put`, `delete`
//! and `iterate` over a bucket. A bucket is an opaque string chosen by the document store
//! (it folds the revision and the collection name together); the backend never interprets it.
//!
//! # Traits
//!
//! - [`KvBackend`]: The core trait for storage backends
//! - [`DynKvBackend`]: A dyn-compatible twin used when the backend is picked at startup
//! - [`KvBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Ordering
//!
//! `iterate` must yield entries in lexical (byte-wise) order of their relative paths, for every
//! implementation. Navigation building and prefix listings depend on this being deterministic.
//!
//! # Examples
//!
//! ```ignore
//! use docbase::backend::KvBackend;
//! use futures::TryStreamExt;
//!
//! let backend = MyBackendImpl::new();
//! backend.put("main~docs", "intro", b"{}".to_vec()).await?;
//!
//! let entries = backend.iterate("main~docs", "").try_collect::<Vec<_>>().await?;
//! assert_eq!(entries[0].relative_path, "intro");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{any::Any, fmt::Debug};

use crate::error::ContentResult;

/// A single entry produced by [`KvBackend::iterate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// The relative path the value is stored under.
    pub relative_path: String,
    /// The raw stored bytes.
    pub value: Vec<u8>,
}

/// Lazy, finite sequence of entries in relative path order.
pub type KvStream<'a> = BoxStream<'a, ContentResult<KvEntry>>;

/// Abstract interface for key-value storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Concurrent reads must not block each other.
///
/// # Error Handling
///
/// Absence is not an error at this layer: `get` returns `Ok(None)`. I/O failures surface as
/// [`ContentError::BackendUnavailable`](crate::error::ContentError::BackendUnavailable).
/// Implementations may retry idempotent reads internally, but must never retry writes.
#[async_trait]
pub trait KvBackend: Send + Sync + Debug {
    /// Fetches the bytes stored under `relative_path` in `bucket`.
    ///
    /// Returns `Ok(None)` if no value is stored.
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>>;

    /// Stores `value` under `relative_path` in `bucket`, replacing any previous value.
    ///
    /// The replacement is atomic: a concurrent reader observes either the old or the new bytes.
    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()>;

    /// Removes the value stored under `relative_path`. Removing an absent key succeeds.
    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()>;

    /// Streams every entry of `bucket` whose relative path starts with `prefix`.
    ///
    /// The stream is finite, ordered lexically by relative path, and a fresh call always
    /// starts from the beginning. It borrows only the backend: implementations copy `bucket`
    /// and `prefix` as needed.
    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op; backends holding connections should override it.
    async fn shutdown(self) -> ContentResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> KvBackend for &B
where
    B: KvBackend,
{
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        (*self).get(bucket, relative_path).await
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        (*self).put(bucket, relative_path, value).await
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        (*self).delete(bucket, relative_path).await
    }

    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        (*self).iterate(bucket, prefix)
    }
}

/// Dyn-compatible view of a [`KvBackend`].
///
/// Every `KvBackend` implements this trait automatically, and `Box<dyn DynKvBackend>`
/// implements `KvBackend` in turn, so the concrete backend can be chosen once at startup.
#[async_trait]
pub trait DynKvBackend: Send + Sync + Debug {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>>;
    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()>;
    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()>;
    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a>;
    async fn shutdown_boxed(self: Box<Self>) -> ContentResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<B: KvBackend + 'static> DynKvBackend for B {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        KvBackend::get(self, bucket, relative_path).await
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        KvBackend::put(self, bucket, relative_path, value).await
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        KvBackend::delete(self, bucket, relative_path).await
    }

    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        KvBackend::iterate(self, bucket, prefix)
    }

    async fn shutdown_boxed(self: Box<Self>) -> ContentResult<()> {
        (*self).shutdown().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[async_trait]
impl KvBackend for Box<dyn DynKvBackend> {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        (**self).get(bucket, relative_path).await
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        (**self).put(bucket, relative_path, value).await
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        (**self).delete(bucket, relative_path).await
    }

    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        (**self).iterate(bucket, prefix)
    }

    async fn shutdown(self) -> ContentResult<()> {
        DynKvBackend::shutdown_boxed(self).await
    }
}

/// Factory for backend instances, used by startup configuration.
#[async_trait]
pub trait KvBackendBuilder {
    type Backend: KvBackend;

    async fn build(self) -> ContentResult<Self::Backend>;
}
