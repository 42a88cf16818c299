//! Revision identity and access to authoritative content history.
//!
//! A [`VersionProvider`] answers two questions: which revision is active right now, and what
//! did a given path look like at a given revision. The document store scopes every read and
//! write to a [`Revision`], and consults [`VersionProvider::blob_at`] only when reconciling live
//! content against history.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ContentError, ContentResult};

/// Opaque revision token: a branch name or a commit id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for Revision {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Source of revision identity and historical content.
///
/// Implementations must be substitutable without changes to the document store or resolver:
/// a constant-token stub is a complete implementation when no history is available.
#[async_trait]
pub trait VersionProvider: Send + Sync + fmt::Debug {
    /// Returns the revision active at the time of the call.
    async fn current_revision(&self) -> ContentResult<Revision>;

    /// Returns the content of `path` as of `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if the path does not exist at that revision.
    async fn blob_at(&self, revision: &Revision, path: &str) -> ContentResult<Vec<u8>>;
}

/// Version provider with a fixed revision and no history.
#[derive(Debug, Clone)]
pub struct StaticVersionProvider {
    revision: Revision,
}

impl StaticVersionProvider {
    pub fn new(revision: impl Into<Revision>) -> Self {
        Self {
            revision: revision.into(),
        }
    }
}

impl Default for StaticVersionProvider {
    fn default() -> Self {
        Self::new("main")
    }
}

#[async_trait]
impl VersionProvider for StaticVersionProvider {
    async fn current_revision(&self) -> ContentResult<Revision> {
        Ok(self.revision.clone())
    }

    async fn blob_at(&self, revision: &Revision, path: &str) -> ContentResult<Vec<u8>> {
        Err(ContentError::not_found(format!("history@{revision}"), path))
    }
}

/// In-memory history of blobs per revision, with a movable current revision.
///
/// Cloned handles share the same history. Useful for tests and for hosts that mirror history
/// from an external service.
#[derive(Debug, Clone)]
pub struct InMemoryHistory {
    current: Arc<RwLock<Revision>>,
    blobs: Arc<RwLock<HashMap<(Revision, String), Vec<u8>>>>,
}

impl InMemoryHistory {
    pub fn new(current: impl Into<Revision>) -> Self {
        Self {
            current: Arc::new(RwLock::new(current.into())),
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Records the content of `path` at `revision`.
    pub async fn record(&self, revision: impl Into<Revision>, path: &str, content: Vec<u8>) {
        self.blobs
            .write()
            .await
            .insert((revision.into(), path.to_string()), content);
    }

    /// Moves the current revision.
    pub async fn checkout(&self, revision: impl Into<Revision>) {
        *self.current.write().await = revision.into();
    }
}

#[async_trait]
impl VersionProvider for InMemoryHistory {
    async fn current_revision(&self) -> ContentResult<Revision> {
        Ok(self.current.read().await.clone())
    }

    async fn blob_at(&self, revision: &Revision, path: &str) -> ContentResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(&(revision.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| ContentError::not_found(format!("history@{revision}"), path))
    }
}
