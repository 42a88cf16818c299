//! Process-wide database handle.
//!
//! [`Database`] is constructed once at startup from a [`DatabaseConfig`] and a loaded
//! [`SchemaRegistry`], shared read-only by every request handler, and torn down with
//! [`Database::shutdown`]. There is no global instance: callers pass the handle around.

use std::sync::Arc;

use tracing::info;

use docbase_core::{
    backend::{DynKvBackend, KvBackendBuilder},
    error::{ContentError, ContentResult},
    resolver::{ContentRequest, QueryResolver, ResponseEnvelope},
    schema::SchemaRegistry,
    store::DocumentStore,
    version::{StaticVersionProvider, VersionProvider},
};
use docbase_memory::InMemoryStore;

use crate::config::{BackendConfig, DatabaseConfig};

/// The document store and resolver for one process.
#[derive(Debug)]
pub struct Database {
    resolver: QueryResolver,
}

impl Database {
    /// Connects the configured backend, reporting `config.branch` as the current revision.
    pub async fn open(config: &DatabaseConfig, registry: SchemaRegistry) -> ContentResult<Self> {
        let versions = Arc::new(StaticVersionProvider::new(config.branch.as_str()));

        Self::open_with(config, registry, versions).await
    }

    /// Connects the configured backend with an explicit version provider.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Configuration`] if the backend cannot be configured, for example
    /// when MongoDB is selected in a build without the `mongodb` feature.
    pub async fn open_with(
        config: &DatabaseConfig,
        registry: SchemaRegistry,
        versions: Arc<dyn VersionProvider>,
    ) -> ContentResult<Self> {
        let backend = build_backend(config).await?;
        let collections = registry.collection_names().count();
        let schema_version = registry.version().to_string();

        let store = Arc::new(DocumentStore::with_versions(backend, registry, versions));
        info!(collections, schema_version = %schema_version, "database opened");

        Ok(Self {
            resolver: QueryResolver::new(store, config.resolver.clone()),
        })
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        self.resolver.store()
    }

    pub fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    /// Resolves a client request. See [`QueryResolver::resolve_request`].
    pub async fn resolve(&self, request: &ContentRequest) -> ResponseEnvelope {
        self.resolver.resolve_request(request).await
    }

    /// Shuts the backend down.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Configuration`] if a clone of the store handle is still alive.
    pub async fn shutdown(self) -> ContentResult<()> {
        let store = Arc::try_unwrap(self.resolver.into_store()).map_err(|_| {
            ContentError::Configuration("document store is still in use".to_string())
        })?;

        store.shutdown().await?;
        info!("database shut down");

        Ok(())
    }
}

async fn build_backend(config: &DatabaseConfig) -> ContentResult<Box<dyn DynKvBackend>> {
    match &config.backend {
        BackendConfig::Local => {
            info!(backend = "local", "building backend");
            Ok(Box::new(InMemoryStore::builder().build().await?))
        }
        #[cfg(feature = "mongodb")]
        BackendConfig::Mongodb {
            uri,
            database,
            collection,
        } => {
            info!(backend = "mongodb", database = %database, collection = %collection, "building backend");
            let store = docbase_mongodb::MongoKvStore::builder(uri, database, collection)
                .retry(config.retry.policy())
                .build()
                .await?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        BackendConfig::Mongodb { .. } => Err(ContentError::Configuration(
            "the mongodb backend requires the `mongodb` feature".to_string(),
        )),
    }
}
