//! Schema-validated, revision-scoped document store.
//!
//! [`DocumentStore`] sits between the query resolver and a [`KvBackend`]. It owns the write
//! path (validate, stamp with the schema version, `put`), the read path (decode, reject stale
//! records), prefix listings, the navigation index and reconciliation against history.
//!
//! Every key lives in a bucket named after the revision and the collection, so content written
//! on one branch is invisible on another.
//!
//! # Example
//!
//! ```ignore
//! use docbase::prelude::*;
//!
//! let store = DocumentStore::new(backend, registry);
//! let revision = store.current_revision().await?;
//!
//! store.write("docs", "intro", body, &revision).await?;
//! let document = store.read("docs", "intro", &revision).await?;
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use futures::{
    TryStreamExt, future,
    stream::{self, BoxStream, StreamExt},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    backend::{DynKvBackend, KvBackend},
    document::{Document, StoredRecord, body_from_slice},
    error::{ContentError, ContentResult},
    index::{
        IndexKey, IndexView, NavigationIndex, NavigationSpec, TitleLookup, expand,
        referenced_paths, source_collections,
    },
    lock::KeyLocks,
    path::RelativePath,
    schema::{Body, SchemaRegistry},
    version::{Revision, StaticVersionProvider, VersionProvider},
};

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// No document existed under the key.
    Created,
    /// An existing document was replaced.
    Updated,
}

/// Live content compared against its authoritative history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Body currently stored, or `None` if the document is absent from the store.
    pub live: Option<Body>,
    /// Body recorded by the version provider.
    pub authoritative: Body,
    /// `true` when the live body differs from the authoritative one.
    pub diverged: bool,
}

/// Document store over a key-value backend.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type. Defaults to a boxed backend chosen at runtime.
///
/// # Concurrency
///
/// Reads never wait on writers. Writes and deletes to the same key are serialized by a
/// key-scoped async mutex that is entered before validation; writes to different keys run
/// concurrently.
#[derive(Debug)]
pub struct DocumentStore<B: KvBackend = Box<dyn DynKvBackend>> {
    backend: B,
    registry: Arc<SchemaRegistry>,
    versions: Arc<dyn VersionProvider>,
    writes: KeyLocks,
    rebuilds: KeyLocks,
    index: NavigationIndex,
}

impl<B: KvBackend> DocumentStore<B> {
    /// Creates a store with a fixed `main` revision and no history.
    pub fn new(backend: B, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self::with_versions(backend, registry, Arc::new(StaticVersionProvider::default()))
    }

    /// Creates a store that takes revisions and history from `versions`.
    pub fn with_versions(
        backend: B,
        registry: impl Into<Arc<SchemaRegistry>>,
        versions: Arc<dyn VersionProvider>,
    ) -> Self {
        Self {
            backend,
            registry: registry.into(),
            versions,
            writes: KeyLocks::new(),
            rebuilds: KeyLocks::new(),
            index: NavigationIndex::new(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks the version provider for the active revision.
    pub async fn current_revision(&self) -> ContentResult<Revision> {
        self.versions.current_revision().await
    }

    /// Reads one document.
    ///
    /// The body is not re-validated, but the record's schema version tag must match the loaded
    /// registry.
    ///
    /// # Errors
    ///
    /// * [`ContentError::UnknownCollection`] if the collection is not declared
    /// * [`ContentError::NotFound`] if nothing is stored under the key
    /// * [`ContentError::StaleSchema`] if the record was written under another schema version
    pub async fn read(
        &self,
        collection: &str,
        relative_path: &str,
        revision: &Revision,
    ) -> ContentResult<Document> {
        self.registry.fields_of(collection)?;
        let path = RelativePath::parse(relative_path)?;

        let bytes = self
            .backend
            .get(&bucket(revision, collection), path.as_str())
            .await?
            .ok_or_else(|| ContentError::not_found(collection, path.as_str()))?;

        StoredRecord::decode(&bytes)?.into_document(
            collection,
            path.as_str(),
            revision,
            self.registry.version(),
        )
    }

    /// Validates and stores `body`, replacing any existing document under the key.
    ///
    /// Validation happens inside the key's write region, so a queued writer always validates
    /// against the state left by the writer before it. A rejected body writes nothing.
    ///
    /// # Errors
    ///
    /// * [`ContentError::Validation`] if the body or path violates the schema
    /// * [`ContentError::UnknownCollection`] if the collection is not declared
    /// * [`ContentError::BackendUnavailable`] if the backend fails
    pub async fn write(
        &self,
        collection: &str,
        relative_path: &str,
        body: Body,
        revision: &Revision,
    ) -> ContentResult<WriteOutcome> {
        self.registry.fields_of(collection)?;
        let path = RelativePath::parse(relative_path)?;
        let bucket = bucket(revision, collection);

        let slot = self.writes.slot(region_key(&bucket, &path));
        let _region = slot.enter().await;

        self.registry.validate(collection, &body)?;

        let outcome = match self.backend.get(&bucket, path.as_str()).await? {
            Some(_) => WriteOutcome::Updated,
            None => WriteOutcome::Created,
        };

        let record = StoredRecord::new(self.registry.version(), body).encode()?;
        self.backend.put(&bucket, path.as_str(), record).await?;
        self.index.invalidate(collection);

        info!(
            collection,
            relative_path = path.as_str(),
            revision = revision.as_str(),
            ?outcome,
            "document written"
        );

        Ok(outcome)
    }

    /// Removes one document.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if nothing is stored under the key.
    pub async fn delete(
        &self,
        collection: &str,
        relative_path: &str,
        revision: &Revision,
    ) -> ContentResult<()> {
        self.registry.fields_of(collection)?;
        let path = RelativePath::parse(relative_path)?;
        let bucket = bucket(revision, collection);

        let slot = self.writes.slot(region_key(&bucket, &path));
        let _region = slot.enter().await;

        if self.backend.get(&bucket, path.as_str()).await?.is_none() {
            return Err(ContentError::not_found(collection, path.as_str()));
        }

        self.backend.delete(&bucket, path.as_str()).await?;
        self.index.invalidate(collection);

        info!(
            collection,
            relative_path = path.as_str(),
            revision = revision.as_str(),
            "document deleted"
        );

        Ok(())
    }

    /// Streams every document of `collection` whose relative path starts with `prefix`, in
    /// lexical path order.
    ///
    /// The stream is lazy and built on the backend cursor. Errors, including stale records,
    /// surface as stream items.
    pub fn list_by_prefix<'a>(
        &'a self,
        collection: &str,
        prefix: &str,
        revision: &Revision,
    ) -> BoxStream<'a, ContentResult<Document>> {
        if let Err(err) = self.registry.fields_of(collection) {
            return stream::once(future::ready(Err(err))).boxed();
        }

        let version = self.registry.version();
        let collection = collection.to_string();
        let revision = revision.clone();

        self.backend
            .iterate(&bucket(&revision, &collection), prefix)
            .and_then(move |entry| {
                let document = StoredRecord::decode(&entry.value).and_then(|record| {
                    record.into_document(&collection, &entry.relative_path, &revision, version)
                });
                future::ready(document)
            })
            .boxed()
    }

    /// Returns the expanded navigation document, rebuilding the cached view when needed.
    ///
    /// Concurrent misses on the same navigation document rebuild it once; the others wait and
    /// take the published view. References to missing documents expand as missing entries.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading the navigation document or listing the
    /// collections it references. Nothing is cached in that case.
    pub async fn navigation(
        &self,
        spec: &NavigationSpec,
        revision: &Revision,
    ) -> ContentResult<Arc<IndexView>> {
        let fields = self.registry.fields_of(&spec.collection)?;
        let path = RelativePath::parse(spec.relative_path.as_str())?;
        let key = IndexKey {
            revision: revision.clone(),
            collection: spec.collection.clone(),
            relative_path: path.as_str().to_string(),
        };

        if let Some(view) = self.index.get(&key).await {
            debug!(collection = %spec.collection, relative_path = path.as_str(), "navigation index hit");
            return Ok(view);
        }

        let slot = self
            .rebuilds
            .slot(region_key(&bucket(revision, &spec.collection), &path));
        let _region = slot.enter().await;

        if let Some(view) = self.index.get(&key).await {
            return Ok(view);
        }

        let sources = source_collections(spec, fields);
        let stamp = self.index.stamp(&sources);

        let navigation = self.read(&spec.collection, path.as_str(), revision).await?;
        let titles = self
            .collect_titles(
                referenced_paths(fields, &navigation.body),
                &spec.title_field,
                revision,
            )
            .await?;
        let (body, entries) = expand(fields, &navigation.body, &titles, &spec.title_field);

        let view = Arc::new(IndexView {
            collection: spec.collection.clone(),
            relative_path: path.into_string(),
            revision: revision.clone(),
            body,
            entries,
        });

        let published = self.index.publish(key, Arc::clone(&view), stamp).await;
        debug!(
            collection = %spec.collection,
            entries = view.entries.len(),
            published,
            "navigation index rebuilt"
        );

        Ok(view)
    }

    /// Reads each referenced target. Targets that do not exist are left out of the lookup.
    async fn collect_titles(
        &self,
        targets: BTreeMap<String, BTreeSet<String>>,
        title_field: &str,
        revision: &Revision,
    ) -> ContentResult<TitleLookup> {
        let mut lookup = TitleLookup::new();
        for (collection, paths) in targets {
            let mut titles = HashMap::new();
            for path in paths {
                match self.read(&collection, &path, revision).await {
                    Ok(document) => {
                        let title = document
                            .field(title_field)
                            .and_then(|value| value.as_str())
                            .map(str::to_string);
                        titles.insert(path, title);
                    }
                    Err(ContentError::NotFound { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            lookup.insert(collection, titles);
        }

        Ok(lookup)
    }

    /// Reads the authoritative body of a document at `revision` from the version provider.
    ///
    /// History blobs live at `<collection>/<relativePath>` and must hold a JSON object.
    pub async fn history(
        &self,
        collection: &str,
        relative_path: &str,
        revision: &Revision,
    ) -> ContentResult<Body> {
        self.registry.fields_of(collection)?;
        let path = RelativePath::parse(relative_path)?;

        let blob = self
            .versions
            .blob_at(revision, &format!("{collection}/{path}"))
            .await?;

        body_from_slice(&blob)
    }

    /// Compares the live document with its authoritative body at `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if history has no such document. A document missing
    /// only from the store is reported as `live: None` and counts as diverged.
    pub async fn reconcile(
        &self,
        collection: &str,
        relative_path: &str,
        revision: &Revision,
    ) -> ContentResult<Reconciliation> {
        let authoritative = self.history(collection, relative_path, revision).await?;
        let live = match self.read(collection, relative_path, revision).await {
            Ok(document) => Some(document.body),
            Err(ContentError::NotFound { .. }) => None,
            Err(err) => return Err(err),
        };

        let diverged = live.as_ref() != Some(&authoritative);
        if diverged {
            debug!(collection, relative_path, revision = revision.as_str(), "live content diverged from history");
        }

        Ok(Reconciliation {
            live,
            authoritative,
            diverged,
        })
    }

    /// Writes the authoritative body recorded at `from` into the store under `into`.
    ///
    /// The body goes through the normal validate-then-write path, so history that no longer
    /// satisfies the schema is rejected.
    pub async fn restore(
        &self,
        collection: &str,
        relative_path: &str,
        from: &Revision,
        into: &Revision,
    ) -> ContentResult<WriteOutcome> {
        let body = self.history(collection, relative_path, from).await?;

        self.write(collection, relative_path, body, into).await
    }

    /// Shuts down the backend, releasing its resources.
    pub async fn shutdown(self) -> ContentResult<()> {
        self.backend.shutdown().await
    }
}

fn bucket(revision: &Revision, collection: &str) -> String {
    format!("{revision}~{collection}")
}

fn region_key(bucket: &str, path: &RelativePath) -> String {
    format!("{bucket}/{path}")
}
