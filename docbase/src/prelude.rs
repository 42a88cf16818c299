//! Convenient re-exports of commonly used types from docbase.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbase::prelude::*;
//! ```
//!
//! This provides access to:
//! - The database handle and its configuration
//! - The document store, schema registry and query resolver
//! - Backend and version provider traits
//! - Error types

pub use crate::{
    config::{BackendConfig, DatabaseConfig},
    database::Database,
};

pub use docbase_core::{
    backend::{DynKvBackend, KvBackend, KvBackendBuilder},
    document::Document,
    error::{ContentError, ContentResult},
    index::{IndexView, NavEntry, NavigationSpec},
    resolver::{ContentRequest, ErrorKind, Query, QueryResolver, ResolverConfig, ResponseData, ResponseEnvelope},
    schema::{Body, FieldDef, FieldType, SchemaRegistry},
    store::{DocumentStore, Reconciliation, WriteOutcome},
    version::{InMemoryHistory, Revision, StaticVersionProvider, VersionProvider},
};
