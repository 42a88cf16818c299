//! Query resolution and the response envelope.
//!
//! The resolver turns an inbound request into one of three query shapes, runs it against the
//! [`DocumentStore`], and wraps the outcome in a [`ResponseEnvelope`]. It is the only place
//! that maps [`ContentError`] variants onto client-facing [`ErrorKind`]s.
//!
//! ```ignore
//! let request: ContentRequest = serde_json::from_str(
//!     r#"{ "collection": "docs", "relativePath": "intro.md" }"#,
//! )?;
//! let envelope = resolver.resolve_request(&request).await;
//! println!("{}", serde_json::to_string(&envelope)?);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::{
    backend::{DynKvBackend, KvBackend},
    document::Document,
    error::{ContentError, ContentResult},
    index::{IndexView, NavigationSpec},
    schema::Body,
    store::DocumentStore,
    version::Revision,
};

/// Location of serialized API schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSchemaSpec {
    pub collection: String,
    pub field: String,
}

impl Default for ApiSchemaSpec {
    fn default() -> Self {
        Self {
            collection: "api-schemas".to_string(),
            field: "apiSchema".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    pub navigation: NavigationSpec,
    pub api_schema: ApiSchemaSpec,
}

/// A resolved query shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Fetch one document.
    Document {
        collection: String,
        relative_path: String,
    },
    /// Fetch the configured navigation document, expanded through the navigation index.
    NavigationBar { relative_path: String },
    /// Fetch selected fields of one document verbatim.
    Project {
        collection: String,
        relative_path: String,
        fields: Vec<String>,
    },
}

/// Inbound request as sent by clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ContentRequest {
    pub fn new(collection: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            relative_path: Some(relative_path.into()),
            variables: Map::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Picks the query shape and the pinned revision, if any.
    ///
    /// `variables.fields` selects a projection; a missing collection or the navigation
    /// collection selects the navigation fetch; anything else is a document fetch.
    pub fn to_query(&self, navigation: &NavigationSpec) -> ContentResult<(Query, Option<Revision>)> {
        let relative_path = self
            .relative_path
            .clone()
            .ok_or_else(|| ContentError::validation("relativePath", "is required"))?;

        let revision = match self.variables.get("revision") {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(Revision::from(token.as_str())),
            Some(_) => {
                return Err(ContentError::validation("variables.revision", "expected a string"));
            }
        };

        let fields = match self.variables.get("fields") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            ContentError::validation("variables.fields", "expected a list of field names")
                        })
                    })
                    .collect::<ContentResult<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(ContentError::validation(
                    "variables.fields",
                    "expected a list of field names",
                ));
            }
        };

        let query = match (self.collection.clone(), fields) {
            (Some(collection), Some(fields)) => Query::Project {
                collection,
                relative_path,
                fields,
            },
            (None, Some(_)) => {
                return Err(ContentError::validation("collection", "is required for a projection"));
            }
            (None, None) => Query::NavigationBar { relative_path },
            (Some(collection), None) if collection == navigation.collection => {
                Query::NavigationBar { relative_path }
            }
            (Some(collection), None) => Query::Document {
                collection,
                relative_path,
            },
        };

        Ok((query, revision))
    }
}

/// Successful response payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Document(Document),
    Navigation(IndexView),
    /// Requested fields by name; fields without a value are `null`.
    Projection(Body),
}

/// Client-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    BackendUnavailable,
    UnknownCollection,
    StaleSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&ContentError> for ErrorBody {
    fn from(err: &ContentError) -> Self {
        let (kind, field) = match err {
            ContentError::NotFound { .. } => (ErrorKind::NotFound, None),
            ContentError::Validation { field, .. } => {
                (ErrorKind::ValidationError, Some(field.clone()))
            }
            ContentError::BackendUnavailable(_) | ContentError::Serialization(_) => {
                (ErrorKind::BackendUnavailable, None)
            }
            ContentError::UnknownCollection(_)
            | ContentError::SchemaLoad(_)
            | ContentError::Configuration(_) => (ErrorKind::UnknownCollection, None),
            ContentError::StaleSchema { .. } => (ErrorKind::StaleSchema, None),
        };

        Self {
            kind,
            message: err.to_string(),
            field,
        }
    }
}

/// Response sent back to clients: exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub data: Option<ResponseData>,
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn ok(data: ResponseData) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(err: &ContentError) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

/// Resolves client queries against a [`DocumentStore`].
#[derive(Debug)]
pub struct QueryResolver<B: KvBackend = Box<dyn DynKvBackend>> {
    store: Arc<DocumentStore<B>>,
    config: ResolverConfig,
}

impl<B: KvBackend> QueryResolver<B> {
    pub fn new(store: Arc<DocumentStore<B>>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<DocumentStore<B>> {
        &self.store
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn into_store(self) -> Arc<DocumentStore<B>> {
        self.store
    }

    /// Resolves a wire request. Never fails: every error is folded into the envelope.
    pub async fn resolve_request(&self, request: &ContentRequest) -> ResponseEnvelope {
        match request.to_query(&self.config.navigation) {
            Ok((query, revision)) => self.resolve_at(&query, revision).await,
            Err(err) => envelope_error(&err),
        }
    }

    /// Resolves `query` at the current revision.
    pub async fn resolve(&self, query: &Query) -> ResponseEnvelope {
        self.resolve_at(query, None).await
    }

    /// Resolves `query` at `revision`, or at the current revision when `None`.
    pub async fn resolve_at(&self, query: &Query, revision: Option<Revision>) -> ResponseEnvelope {
        match self.try_resolve(query, revision).await {
            Ok(data) => ResponseEnvelope::ok(data),
            Err(err) => envelope_error(&err),
        }
    }

    /// Runs `query` and returns the raw result.
    ///
    /// The revision is read from the version provider at most once, so every read made for one
    /// query observes the same revision.
    pub async fn try_resolve(
        &self,
        query: &Query,
        revision: Option<Revision>,
    ) -> ContentResult<ResponseData> {
        let revision = match revision {
            Some(revision) => revision,
            None => self.store.current_revision().await?,
        };

        match query {
            Query::Document {
                collection,
                relative_path,
            } => {
                let document = self.store.read(collection, relative_path, &revision).await?;
                Ok(ResponseData::Document(document))
            }
            Query::NavigationBar { relative_path } => {
                let spec = NavigationSpec {
                    relative_path: relative_path.clone(),
                    ..self.config.navigation.clone()
                };
                let view = self.store.navigation(&spec, &revision).await?;
                Ok(ResponseData::Navigation(IndexView::clone(&view)))
            }
            Query::Project {
                collection,
                relative_path,
                fields,
            } => {
                let declared = self.store.registry().fields_of(collection)?;
                if let Some(unknown) = fields
                    .iter()
                    .find(|name| !declared.iter().any(|field| field.name == **name))
                {
                    return Err(ContentError::validation(
                        "variables.fields",
                        format!("`{unknown}` is not declared in collection `{collection}`"),
                    ));
                }

                let document = self.store.read(collection, relative_path, &revision).await?;
                let projection = fields
                    .iter()
                    .map(|name| {
                        let value = document.field(name).cloned().unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect();
                Ok(ResponseData::Projection(projection))
            }
        }
    }

    /// Fetches the navigation document at its configured path.
    pub async fn navigation_bar(&self) -> ContentResult<Arc<IndexView>> {
        let revision = self.store.current_revision().await?;
        self.store.navigation(&self.config.navigation, &revision).await
    }

    /// Reads and parses the API schema stored at `relative_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if the document does not exist or its schema field is
    /// missing or empty, and [`ContentError::Serialization`] if the blob is not valid JSON.
    pub async fn api_schema(&self, relative_path: &str) -> ContentResult<Value> {
        let spec = &self.config.api_schema;
        let query = Query::Project {
            collection: spec.collection.clone(),
            relative_path: relative_path.to_string(),
            fields: vec![spec.field.clone()],
        };

        let blob = match self.try_resolve(&query, None).await? {
            ResponseData::Projection(mut values) => values.remove(&spec.field),
            _ => None,
        };

        match blob {
            Some(Value::String(source)) if !source.trim().is_empty() => {
                Ok(serde_json::from_str(&source)?)
            }
            Some(Value::Object(schema)) => Ok(Value::Object(schema)),
            _ => Err(ContentError::not_found(&spec.collection, relative_path)),
        }
    }
}

fn envelope_error(err: &ContentError) -> ResponseEnvelope {
    match err {
        ContentError::NotFound { .. } => debug!(error = %err, "query resolved to nothing"),
        ContentError::UnknownCollection(_)
        | ContentError::SchemaLoad(_)
        | ContentError::Configuration(_) => error!(error = %err, "configuration fault"),
        ContentError::Validation { .. } => debug!(error = %err, "rejected query"),
        _ => warn!(error = %err, "query failed"),
    }

    ResponseEnvelope::err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::SchemaRegistry,
        testing::{DownBackend, MapBackend},
    };
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::load(&json!({
            "docs": [
                { "name": "title", "type": "string", "required": true },
                { "name": "body", "type": "rich-text" }
            ],
            "navigation-bar": [
                { "name": "items", "type": "list", "of": "reference", "collections": ["docs"] }
            ],
            "api-schemas": [
                { "name": "apiSchema", "type": "string" }
            ]
        }))
        .unwrap()
    }

    async fn resolver() -> QueryResolver<MapBackend> {
        let store = DocumentStore::new(MapBackend::default(), registry());
        let main = Revision::from("main");
        for (collection, path, body) in [
            ("docs", "intro.md", json!({ "title": "Intro", "body": "# Hi" })),
            ("navigation-bar", "docs-navigation-bar.json", json!({ "items": ["intro.md"] })),
            ("api-schemas", "petstore.json", json!({ "apiSchema": "{\"openapi\":\"3.0.0\"}" })),
            ("api-schemas", "empty.json", json!({ "apiSchema": "" })),
        ] {
            store
                .write(collection, path, body.as_object().cloned().unwrap(), &main)
                .await
                .unwrap();
        }

        QueryResolver::new(Arc::new(store), ResolverConfig::default())
    }

    #[test]
    fn request_shapes() {
        let nav = NavigationSpec::default();

        let (query, revision) = ContentRequest::new("docs", "a").to_query(&nav).unwrap();
        assert!(matches!(query, Query::Document { .. }));
        assert_eq!(revision, None);

        let request = ContentRequest {
            relative_path: Some("docs-navigation-bar.json".to_string()),
            ..ContentRequest::default()
        };
        assert!(matches!(request.to_query(&nav).unwrap().0, Query::NavigationBar { .. }));

        let (query, revision) = ContentRequest::new("api-schemas", "x")
            .with_variable("fields", json!(["apiSchema"]))
            .with_variable("revision", json!("feature"))
            .to_query(&nav)
            .unwrap();
        assert!(matches!(query, Query::Project { ref fields, .. } if fields == &["apiSchema"]));
        assert_eq!(revision, Some(Revision::from("feature")));

        let err = ContentRequest {
            collection: Some("docs".to_string()),
            ..ContentRequest::default()
        }
        .to_query(&nav)
        .unwrap_err();
        assert_eq!(err, ContentError::validation("relativePath", "is required"));
    }

    #[tokio::test]
    async fn resolves_document() {
        let resolver = resolver().await;

        let envelope = resolver
            .resolve_request(&ContentRequest::new("docs", "intro.md"))
            .await;
        let wire = serde_json::to_value(&envelope).unwrap();

        assert!(envelope.is_ok());
        assert_eq!(wire["data"]["body"]["title"], json!("Intro"));
        assert_eq!(wire["data"]["relativePath"], json!("intro.md"));
        assert_eq!(wire["error"], Value::Null);
    }

    #[tokio::test]
    async fn maps_errors_to_kinds() {
        let resolver = resolver().await;

        let missing = resolver
            .resolve_request(&ContentRequest::new("docs", "missing.md"))
            .await;
        assert_eq!(missing.error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(missing.data, None);

        let unknown = resolver
            .resolve_request(&ContentRequest::new("blog", "a.md"))
            .await;
        assert_eq!(unknown.error_kind(), Some(ErrorKind::UnknownCollection));

        let invalid = resolver.resolve_request(&ContentRequest::default()).await;
        let wire = serde_json::to_value(&invalid).unwrap();
        assert_eq!(wire["error"]["kind"], json!("ValidationError"));
        assert_eq!(wire["error"]["field"], json!("relativePath"));
    }

    #[tokio::test]
    async fn resolves_navigation_bar() {
        let resolver = resolver().await;

        let envelope = resolver
            .resolve_request(&ContentRequest::new("navigation-bar", "docs-navigation-bar.json"))
            .await;

        match envelope.data {
            Some(ResponseData::Navigation(view)) => {
                assert_eq!(view.entries[0].title.as_deref(), Some("Intro"));
                assert_eq!(view.body["items"][0]["collection"], json!("docs"));
            }
            other => panic!("unexpected data: {other:?}"),
        }
        assert_eq!(resolver.navigation_bar().await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn projects_requested_fields() {
        let resolver = resolver().await;

        let data = resolver
            .try_resolve(
                &Query::Project {
                    collection: "docs".to_string(),
                    relative_path: "intro.md".to_string(),
                    fields: vec!["body".to_string()],
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            data,
            ResponseData::Projection(json!({ "body": "# Hi" }).as_object().cloned().unwrap())
        );

        let err = resolver
            .try_resolve(
                &Query::Project {
                    collection: "docs".to_string(),
                    relative_path: "intro.md".to_string(),
                    fields: vec!["author".to_string()],
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Validation { ref field, .. } if field == "variables.fields"));
    }

    #[tokio::test]
    async fn api_schema_is_parsed() {
        let resolver = resolver().await;

        assert_eq!(
            resolver.api_schema("petstore.json").await.unwrap(),
            json!({ "openapi": "3.0.0" })
        );
        assert!(resolver.api_schema("empty.json").await.unwrap_err().is_not_found());
        assert!(resolver.api_schema("missing.json").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn pinned_revision_is_honoured() {
        let resolver = resolver().await;

        let envelope = resolver
            .resolve_request(
                &ContentRequest::new("docs", "intro.md").with_variable("revision", json!("other")),
            )
            .await;

        assert_eq!(envelope.error_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn unreachable_backend_is_reported() {
        let store = DocumentStore::new(DownBackend, registry());
        let resolver = QueryResolver::new(Arc::new(store), ResolverConfig::default());

        let envelope = resolver
            .resolve_request(&ContentRequest::new("docs", "intro.md"))
            .await;

        assert_eq!(envelope.error_kind(), Some(ErrorKind::BackendUnavailable));
    }

    #[tokio::test]
    async fn stale_records_are_reported() {
        let backend = MapBackend::default();
        let old = DocumentStore::new(backend.clone(), registry().with_version("old"));
        old.write(
            "docs",
            "intro.md",
            json!({ "title": "Intro" }).as_object().cloned().unwrap(),
            &Revision::from("main"),
        )
        .await
        .unwrap();

        let resolver = QueryResolver::new(
            Arc::new(DocumentStore::new(backend, registry())),
            ResolverConfig::default(),
        );
        let envelope = resolver
            .resolve_request(&ContentRequest::new("docs", "intro.md"))
            .await;

        assert_eq!(envelope.error_kind(), Some(ErrorKind::StaleSchema));
    }
}
