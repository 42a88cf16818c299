//! Error types and result types for content database operations.
//!
//! Every fallible operation in the workspace returns [`ContentResult<T>`]. Backends and the
//! schema registry raise precise variants; the document store passes them through untouched,
//! and only the query resolver maps them onto the response envelope.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with the content database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    /// No document is stored under the given key. This is an expected outcome, not a fault.
    #[error("Document {relative_path} not found in collection {collection}")]
    NotFound {
        collection: String,
        relative_path: String,
    },
    /// A caller-supplied body (or path) violates the declared schema.
    #[error("Invalid field {field}: {reason}")]
    Validation { field: String, reason: String },
    /// The storage backend could not be reached or failed while serving the request.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The schema registry has no collection with this name.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    /// The stored document was written under a different schema version than the one loaded.
    #[error(
        "Document {relative_path} in collection {collection} was stored with schema {stored}, current schema is {current}"
    )]
    StaleSchema {
        collection: String,
        relative_path: String,
        stored: String,
        current: String,
    },
    /// The schema definition could not be loaded.
    #[error("Schema load error: {0}")]
    SchemaLoad(String),
    /// Stored bytes or a history blob could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Startup configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ContentError {
    pub fn not_found(collection: impl Into<String>, relative_path: impl Into<String>) -> Self {
        ContentError::NotFound {
            collection: collection.into(),
            relative_path: relative_path.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ContentError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`ContentError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound { .. })
    }
}

/// A specialized `Result` type for content database operations.
pub type ContentResult<T> = Result<T, ContentError>;

impl From<SerdeJsonError> for ContentError {
    fn from(err: SerdeJsonError) -> Self {
        ContentError::Serialization(err.to_string())
    }
}
