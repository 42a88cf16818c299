//! In-memory key-value backend for docbase.
//!
//! This crate provides a thread-safe, in-process implementation of the `KvBackend` trait. It is
//! the backend used for local development, where content lives only as long as the process.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Ordered iteration** - Buckets are B-trees, so prefix scans come out in path order
//! - **Shared state** - Clones of one store see the same content
//!
//! # Quick Start
//!
//! ```ignore
//! use docbase::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::from_json_str(include_str!("schema.json"))?;
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend, registry);
//!
//!     let revision = store.current_revision().await?;
//!     let intro = store.read("docs", "intro.md", &revision).await;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_memory;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
