//! A schema-governed content database layer for documentation sites.
//!
//! This crate is the core of the docbase project and provides:
//!
//! - **Backend abstraction** ([`backend`]) - Byte-oriented key-value traits implemented by each driver
//! - **Schema registry** ([`schema`]) - Declarative collection schemas and document validation
//! - **Documents** ([`document`]) - Documents as read from the store, and their stored record format
//! - **Document store** ([`store`]) - Validated, revision-scoped reads, writes and prefix listings
//! - **Navigation index** ([`index`]) - Cached, reference-expanded views of the navigation document
//! - **Query resolver** ([`resolver`]) - Client queries and the response envelope
//! - **Versioning** ([`version`]) - Revisions and access to authoritative history
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docbase_core::{schema::SchemaRegistry, store::DocumentStore, version::Revision};
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::load(&json!({
//!     "docs": [{ "name": "title", "type": "string", "required": true }]
//! }))?;
//! let store = DocumentStore::new(backend, registry);
//!
//! let body = json!({ "title": "Introduction" }).as_object().cloned().unwrap();
//! store.write("docs", "intro.md", body, &Revision::from("main")).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_core;

pub mod backend;
pub mod document;
pub mod error;
pub mod index;
pub mod path;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod version;

mod lock;

#[cfg(test)]
mod testing;
