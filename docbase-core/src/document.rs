//! Document representation and the on-disk record format.
//!
//! Backends only ever see opaque bytes. The document store wraps every body in a
//! [`StoredRecord`] that carries the schema version tag it was validated against, so that a
//! later read can detect records written under an older schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ContentError, ContentResult},
    schema::Body,
    version::Revision,
};

/// A document read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Name of the collection the document belongs to.
    pub collection: String,
    /// Unique path of the document within its collection.
    pub relative_path: String,
    /// Revision the document was read under.
    pub revision: Revision,
    /// Schema version tag the body was validated against when written.
    pub schema_version: String,
    /// Time of the last successful write.
    pub written_at: DateTime<Utc>,
    /// Field values.
    pub body: Body,
}

impl Document {
    /// Returns the value of a top-level field, if present.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.body.get(name)
    }
}

/// Serialized form of a document as stored by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredRecord {
    pub schema_version: String,
    pub written_at: DateTime<Utc>,
    pub body: Body,
}

impl StoredRecord {
    pub(crate) fn new(schema_version: &str, body: Body) -> Self {
        Self {
            schema_version: schema_version.to_string(),
            written_at: Utc::now(),
            body,
        }
    }

    pub(crate) fn encode(&self) -> ContentResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> ContentResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Converts the record into a [`Document`], rejecting records stamped with another schema.
    pub(crate) fn into_document(
        self,
        collection: &str,
        relative_path: &str,
        revision: &Revision,
        current_version: &str,
    ) -> ContentResult<Document> {
        if self.schema_version != current_version {
            return Err(ContentError::StaleSchema {
                collection: collection.to_string(),
                relative_path: relative_path.to_string(),
                stored: self.schema_version,
                current: current_version.to_string(),
            });
        }

        Ok(Document {
            collection: collection.to_string(),
            relative_path: relative_path.to_string(),
            revision: revision.clone(),
            schema_version: self.schema_version,
            written_at: self.written_at,
            body: self.body,
        })
    }
}

/// Parses a JSON object into a [`Body`], as found in history blobs.
pub(crate) fn body_from_slice(bytes: &[u8]) -> ContentResult<Body> {
    match serde_json::from_slice(bytes)? {
        serde_json::Value::Object(body) => Ok(body),
        _ => Err(ContentError::Serialization(
            "document content must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Body {
        json!({ "title": "Intro", "order": 1, "tags": ["a", "b"] })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn record_keeps_body_intact() {
        let record = StoredRecord::new("abc", body());
        let decoded = StoredRecord::decode(&record.encode().unwrap()).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn mismatched_schema_version_is_stale() {
        let record = StoredRecord::new("old", body());
        let result = record.into_document("docs", "intro", &Revision::from("main"), "new");

        match result {
            Err(ContentError::StaleSchema { stored, current, .. }) => {
                assert_eq!(stored, "old");
                assert_eq!(current, "new");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            StoredRecord::decode(b"not json"),
            Err(ContentError::Serialization(_))
        ));
        assert!(matches!(
            body_from_slice(b"[1, 2]"),
            Err(ContentError::Serialization(_))
        ));
    }
}
