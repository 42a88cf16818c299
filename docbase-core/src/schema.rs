//! Declarative collection schema: loading and document validation.
//!
//! The schema is an externally supplied contract, loaded once at startup from a JSON mapping of
//! collection name to an ordered list of field definitions:
//!
//! ```json
//! {
//!   "docs": [
//!     { "name": "title", "type": "string", "required": true },
//!     { "name": "body", "type": "rich-text" },
//!     { "name": "tags", "type": "list", "of": "string" },
//!     { "name": "seo", "type": "object", "fields": [{ "name": "description", "type": "string" }] }
//!   ],
//!   "navigation-bar": [
//!     { "name": "items", "type": "list", "of": "reference", "collections": ["docs"] }
//!   ]
//! }
//! ```
//!
//! Field type tags form a closed set ([`FieldType`]); an unknown tag fails the load instead of
//! being passed through. The loaded [`SchemaRegistry`] is immutable and carries a version tag
//! that every stored record is stamped with.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    error::{ContentError, ContentResult},
    path::is_well_formed,
};

/// Document body: field name to JSON value.
pub type Body = Map<String, Value>;

/// Closed set of field types a collection may declare.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// Relative path of a document in one of `collections`.
    Reference { collections: Vec<String> },
    /// Markdown source or a rich-text AST object.
    RichText,
    List { of: Box<FieldType> },
    Object { fields: Vec<FieldDef> },
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Boolean => "a boolean",
            FieldType::Reference { .. } => "a reference path",
            FieldType::RichText => "rich text",
            FieldType::List { .. } => "a list",
            FieldType::Object { .. } => "an object",
        }
    }

    /// Collections a value of this type may point at, including through lists and objects.
    pub fn referenced_collections(&self) -> Vec<&str> {
        match self {
            FieldType::Reference { collections } => collections.iter().map(String::as_str).collect(),
            FieldType::List { of } => of.referenced_collections(),
            FieldType::Object { fields } => fields
                .iter()
                .flat_map(|field| field.field_type.referenced_collections())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    pub required: bool,
}

/// Field definition as it appears in the schema source, before tag resolution.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    of: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    collections: Vec<String>,
}

/// Immutable, validated schema for every collection known to the process.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    collections: BTreeMap<String, Vec<FieldDef>>,
    version: String,
}

impl SchemaRegistry {
    /// Loads a registry from a parsed schema definition.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::SchemaLoad`] if the definition is not a mapping of collection
    /// names to field lists, names a collection with a `~`, uses an unknown type tag, declares a
    /// field twice, or references a collection that is not declared.
    pub fn load(definition: &Value) -> ContentResult<Self> {
        let raw: BTreeMap<String, Vec<RawField>> = serde_json::from_value(definition.clone())
            .map_err(|e| ContentError::SchemaLoad(e.to_string()))?;

        let mut collections = BTreeMap::new();
        for (name, fields) in raw {
            if name.is_empty() {
                return Err(ContentError::SchemaLoad("collection name is empty".to_string()));
            }
            // `~` separates the revision from the collection in backend bucket names.
            if name.contains('~') {
                return Err(ContentError::SchemaLoad(format!(
                    "collection name `{name}` must not contain `~`"
                )));
            }

            let fields = convert_fields(&name, &fields)?;
            collections.insert(name, fields);
        }

        for (name, fields) in &collections {
            for field in fields {
                for target in field.field_type.referenced_collections() {
                    if !collections.contains_key(target) {
                        return Err(ContentError::SchemaLoad(format!(
                            "field `{}` in collection `{name}` references unknown collection `{target}`",
                            field.name
                        )));
                    }
                }
            }
        }

        let version = digest(&collections)?;

        Ok(Self { collections, version })
    }

    /// Loads a registry from a JSON string.
    pub fn from_json_str(source: &str) -> ContentResult<Self> {
        let definition: Value =
            serde_json::from_str(source).map_err(|e| ContentError::SchemaLoad(e.to_string()))?;

        Self::load(&definition)
    }

    /// Replaces the derived version tag with an explicit one.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The version tag stamped on every record written under this registry.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns `true` if the registry declares `collection`.
    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Names of all declared collections, in lexical order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Returns the ordered field list of `collection`.
    pub fn fields_of(&self, collection: &str) -> ContentResult<&[FieldDef]> {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .ok_or_else(|| ContentError::UnknownCollection(collection.to_string()))
    }

    /// Validates `body` against the declared fields of `collection`.
    ///
    /// Only declared fields are inspected: undeclared keys are ignored, and a `null` value
    /// counts as absent. The first violation is reported with the dotted path of the field.
    pub fn validate(&self, collection: &str, body: &Body) -> ContentResult<()> {
        validate_fields(self.fields_of(collection)?, body, "")
    }
}

fn convert_fields(collection: &str, raw: &[RawField]) -> ContentResult<Vec<FieldDef>> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(raw.len());

    for field in raw {
        if field.name.is_empty() {
            return Err(ContentError::SchemaLoad(format!(
                "collection `{collection}` declares a field without a name"
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ContentError::SchemaLoad(format!(
                "collection `{collection}` declares field `{}` twice",
                field.name
            )));
        }

        fields.push(FieldDef {
            name: field.name.clone(),
            field_type: convert_type(collection, field, &field.type_tag)?,
            required: field.required,
        });
    }

    Ok(fields)
}

fn convert_type(collection: &str, raw: &RawField, tag: &str) -> ContentResult<FieldType> {
    let load_error = |reason: &str| {
        ContentError::SchemaLoad(format!(
            "field `{}` in collection `{collection}`: {reason}",
            raw.name
        ))
    };

    match tag {
        "string" => Ok(FieldType::String),
        "number" => Ok(FieldType::Number),
        "boolean" => Ok(FieldType::Boolean),
        "rich-text" => Ok(FieldType::RichText),
        "reference" => {
            if raw.collections.is_empty() {
                return Err(load_error("reference fields must name their collections"));
            }
            Ok(FieldType::Reference {
                collections: raw.collections.clone(),
            })
        }
        "object" => {
            if raw.fields.is_empty() {
                return Err(load_error("object fields must declare nested fields"));
            }
            Ok(FieldType::Object {
                fields: convert_fields(collection, &raw.fields)?,
            })
        }
        "list" => match raw.of.as_deref() {
            None => Err(load_error("list fields must declare their item type with `of`")),
            Some("list") => Err(load_error("lists of lists are not supported")),
            Some(item) => Ok(FieldType::List {
                of: Box::new(convert_type(collection, raw, item)?),
            }),
        },
        other => Err(load_error(&format!("unknown field type `{other}`"))),
    }
}

fn digest(collections: &BTreeMap<String, Vec<FieldDef>>) -> ContentResult<String> {
    let canonical = serde_json::to_vec(collections)?;
    let hash = Sha256::digest(&canonical);

    Ok(hex::encode(&hash[..8]))
}

fn validate_fields(fields: &[FieldDef], body: &Body, parent: &str) -> ContentResult<()> {
    for field in fields {
        let path = if parent.is_empty() {
            field.name.clone()
        } else {
            format!("{parent}.{}", field.name)
        };

        match body.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(ContentError::validation(path, "required field is missing"));
                }
            }
            Some(value) => validate_value(&field.field_type, value, &path)?,
        }
    }

    Ok(())
}

fn validate_value(field_type: &FieldType, value: &Value, path: &str) -> ContentResult<()> {
    let mismatch = || {
        ContentError::validation(
            path,
            format!("expected {}, found {}", field_type.describe(), json_kind(value)),
        )
    };

    match (field_type, value) {
        (FieldType::String, Value::String(_)) => Ok(()),
        (FieldType::Number, Value::Number(_)) => Ok(()),
        (FieldType::Boolean, Value::Bool(_)) => Ok(()),
        (FieldType::RichText, Value::String(_) | Value::Object(_)) => Ok(()),
        (FieldType::Reference { .. }, Value::String(target)) => {
            if is_well_formed(target) {
                Ok(())
            } else {
                Err(ContentError::validation(
                    path,
                    format!("`{target}` is not a well-formed relative path"),
                ))
            }
        }
        (FieldType::List { of }, Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                validate_value(of, item, &format!("{path}[{index}]"))?;
            }
            Ok(())
        }
        (FieldType::Object { fields }, Value::Object(map)) => validate_fields(fields, map, path),
        _ => Err(mismatch()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
