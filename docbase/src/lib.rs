//! Main docbase crate: a schema-governed content database for documentation sites.
//!
//! This crate is the primary entry point for users of docbase. It re-exports the core types
//! from the sub-crates, provides the startup configuration and the process-wide [`Database`]
//! handle, and gives access to the storage backends.
//!
//! # Features
//!
//! - **Schema-validated documents** - Every write is checked against a declared collection schema
//! - **Multiple backends** - In-memory and MongoDB storage behind one key-value trait
//! - **Navigation index** - Reference-expanded navigation views, cached and invalidated on write
//! - **History reconciliation** - Compare and restore content against a version provider
//!
//! # Quick Start
//!
//! ```ignore
//! use docbase::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::load(&json!({
//!         "docs": [{ "name": "title", "type": "string", "required": true }]
//!     }))?;
//!     let database = Database::open(&DatabaseConfig::from_env()?, registry).await?;
//!
//!     let revision = database.store().current_revision().await?;
//!     let body = json!({ "title": "Intro" }).as_object().cloned().unwrap();
//!     database.store().write("docs", "intro", body, &revision).await?;
//!
//!     let envelope = database.resolve(&ContentRequest::new("docs", "intro")).await;
//!     println!("{}", serde_json::to_string(&envelope)?);
//!
//!     database.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process storage for local development and tests
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)
//!
//! The backend is chosen once, when [`Database::open`] reads the [`DatabaseConfig`]; the rest
//! of the program only sees the key-value trait.

pub mod config;
pub mod database;
pub mod prelude;

#[cfg(feature = "git")]
pub mod git;

pub use docbase_core::{backend, document, error, index, path, resolver, schema, store, version};

pub use config::{BackendConfig, DatabaseConfig, RetrySettings};
pub use database::Database;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbase_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbase_mongodb::{MongoKvStore, MongoKvStoreBuilder, RetryPolicy};
}
