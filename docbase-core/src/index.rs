//! Navigation index: a cached, reference-expanded view of the navigation document.
//!
//! The view is derived entirely from the document store and is never the source of truth.
//! Every cached view remembers its source collections (the navigation collection plus each
//! collection its reference fields point at); a write to any of them drops the view.
//!
//! Rebuilds race with invalidations. Each collection carries a generation counter; a rebuild
//! stamps the generations of its sources before reading and only publishes if none moved.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex as StdMutex, MutexGuard},
};

use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    schema::{Body, FieldDef, FieldType},
    version::Revision,
};

/// Where the navigation document lives and which field carries display titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationSpec {
    pub collection: String,
    pub relative_path: String,
    pub title_field: String,
}

impl Default for NavigationSpec {
    fn default() -> Self {
        Self {
            collection: "navigation-bar".to_string(),
            relative_path: "docs-navigation-bar.json".to_string(),
            title_field: "title".to_string(),
        }
    }
}

/// One flattened navigation entry, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavEntry {
    /// Path of the referenced document.
    pub relative_path: String,
    /// Collection the reference resolved in, or `None` if the target does not exist.
    pub collection: Option<String>,
    /// Title of the referenced document, if it has one.
    pub title: Option<String>,
    /// Titles of the enclosing navigation groups, outermost first.
    pub trail: Vec<String>,
}

/// Expanded navigation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexView {
    pub collection: String,
    pub relative_path: String,
    pub revision: Revision,
    /// The navigation body with every reference replaced by a `{collection, relativePath, title}`
    /// object, or `{relativePath, missing: true}` when the target does not exist.
    pub body: Body,
    pub entries: Vec<NavEntry>,
}

/// Titles of candidate reference targets: collection -> relative path -> title.
pub(crate) type TitleLookup = HashMap<String, HashMap<String, Option<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IndexKey {
    pub revision: Revision,
    pub collection: String,
    pub relative_path: String,
}

/// Generations of a view's source collections, taken before the view was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Stamp(Vec<(String, u64)>);

#[derive(Debug)]
struct CachedView {
    view: Arc<IndexView>,
    stamp: Stamp,
}

#[derive(Debug)]
pub(crate) struct NavigationIndex {
    views: RwLock<HashMap<IndexKey, CachedView>>,
    generations: StdMutex<HashMap<String, u64>>,
}

impl NavigationIndex {
    pub(crate) fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            generations: StdMutex::new(HashMap::new()),
        }
    }

    /// Returns the cached view for `key` unless one of its sources changed since it was built.
    pub(crate) async fn get(&self, key: &IndexKey) -> Option<Arc<IndexView>> {
        let views = self.views.read().await;
        let cached = views.get(key)?;

        self.is_current(&cached.stamp)
            .then(|| Arc::clone(&cached.view))
    }

    /// Records the current generation of every source collection.
    pub(crate) fn stamp(&self, sources: &[String]) -> Stamp {
        let generations = self.lock_generations();
        Stamp(
            sources
                .iter()
                .map(|source| (source.clone(), generations.get(source).copied().unwrap_or(0)))
                .collect(),
        )
    }

    /// Publishes a rebuilt view unless a source was invalidated after `stamp` was taken.
    pub(crate) async fn publish(&self, key: IndexKey, view: Arc<IndexView>, stamp: Stamp) -> bool {
        let mut views = self.views.write().await;
        if !self.is_current(&stamp) {
            return false;
        }

        views.insert(key, CachedView { view, stamp });
        true
    }

    /// Marks every view built from `collection` as stale.
    ///
    /// Synchronous, so a write that has reached its backend `put` cannot be abandoned before
    /// the invalidation lands.
    pub(crate) fn invalidate(&self, collection: &str) {
        *self
            .lock_generations()
            .entry(collection.to_string())
            .or_insert(0) += 1;
    }

    fn is_current(&self, stamp: &Stamp) -> bool {
        let generations = self.lock_generations();
        stamp
            .0
            .iter()
            .all(|(source, seen)| generations.get(source).copied().unwrap_or(0) == *seen)
    }

    fn lock_generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Collections whose writes can change the expanded view of a navigation document.
pub(crate) fn source_collections(spec: &NavigationSpec, fields: &[FieldDef]) -> Vec<String> {
    let mut sources = vec![spec.collection.clone()];
    for field in fields {
        for target in field.field_type.referenced_collections() {
            if !sources.iter().any(|source| source == target) {
                sources.push(target.to_string());
            }
        }
    }

    sources
}

/// Reference targets in `body`, grouped by each collection they may resolve in.
pub(crate) fn referenced_paths(
    fields: &[FieldDef],
    body: &Body,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut targets = BTreeMap::new();
    collect_object(fields, body, &mut targets);

    targets
}

fn collect_object(
    fields: &[FieldDef],
    body: &Body,
    targets: &mut BTreeMap<String, BTreeSet<String>>,
) {
    for field in fields {
        if let Some(value) = body.get(&field.name) {
            collect_value(&field.field_type, value, targets);
        }
    }
}

fn collect_value(
    field_type: &FieldType,
    value: &Value,
    targets: &mut BTreeMap<String, BTreeSet<String>>,
) {
    match (field_type, value) {
        (FieldType::Reference { collections }, Value::String(target)) => {
            for collection in collections {
                targets
                    .entry(collection.clone())
                    .or_default()
                    .insert(target.clone());
            }
        }
        (FieldType::List { of }, Value::Array(items)) => {
            for item in items {
                collect_value(of, item, targets);
            }
        }
        (FieldType::Object { fields }, Value::Object(map)) => collect_object(fields, map, targets),
        _ => {}
    }
}

/// Expands every declared reference in `body` and collects the flattened entries.
pub(crate) fn expand(
    fields: &[FieldDef],
    body: &Body,
    titles: &TitleLookup,
    title_field: &str,
) -> (Body, Vec<NavEntry>) {
    let mut expander = Expander {
        titles,
        title_field,
        trail: Vec::new(),
        entries: Vec::new(),
    };
    let expanded = expander.object(fields, body);

    (expanded, expander.entries)
}

struct Expander<'a> {
    titles: &'a TitleLookup,
    title_field: &'a str,
    trail: Vec<String>,
    entries: Vec<NavEntry>,
}

impl Expander<'_> {
    fn object(&mut self, fields: &[FieldDef], body: &Body) -> Body {
        let mut out = body.clone();
        for field in fields {
            if let Some(value) = body.get(&field.name) {
                out.insert(field.name.clone(), self.value(&field.field_type, value));
            }
        }

        out
    }

    fn value(&mut self, field_type: &FieldType, value: &Value) -> Value {
        match (field_type, value) {
            (FieldType::Reference { collections }, Value::String(target)) => {
                self.reference(collections, target)
            }
            (FieldType::List { of }, Value::Array(items)) => Value::Array(
                items.iter().map(|item| self.value(of, item)).collect(),
            ),
            (FieldType::Object { fields }, Value::Object(map)) => {
                let group = map
                    .get(self.title_field)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let pushed = group.is_some();
                if let Some(group) = group {
                    self.trail.push(group);
                }

                let expanded = self.object(fields, map);

                if pushed {
                    self.trail.pop();
                }
                Value::Object(expanded)
            }
            _ => value.clone(),
        }
    }

    fn reference(&mut self, collections: &[String], target: &str) -> Value {
        let resolved = collections.iter().find_map(|collection| {
            self.titles
                .get(collection)
                .and_then(|paths| paths.get(target))
                .map(|title| (collection.clone(), title.clone()))
        });

        let (collection, title) = match resolved {
            Some((collection, title)) => (Some(collection), title),
            None => (None, None),
        };

        self.entries.push(NavEntry {
            relative_path: target.to_string(),
            collection: collection.clone(),
            title: title.clone(),
            trail: self.trail.clone(),
        });

        match collection {
            Some(collection) => {
                let mut resolved = Map::new();
                resolved.insert("collection".to_string(), Value::String(collection));
                resolved.insert("relativePath".to_string(), Value::String(target.to_string()));
                resolved.insert(
                    self.title_field.to_string(),
                    title.map(Value::String).unwrap_or(Value::Null),
                );
                Value::Object(resolved)
            }
            None => json!({ "relativePath": target, "missing": true }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::load(&json!({
            "docs": [{ "name": "title", "type": "string" }],
            "navigation-bar": [
                { "name": "title", "type": "string" },
                { "name": "groups", "type": "list", "of": "object", "fields": [
                    { "name": "title", "type": "string" },
                    { "name": "items", "type": "list", "of": "reference", "collections": ["docs"] }
                ]}
            ]
        }))
        .unwrap()
    }

    fn titles() -> TitleLookup {
        let mut docs = HashMap::new();
        docs.insert("intro".to_string(), Some("Introduction".to_string()));
        docs.insert("setup".to_string(), None);

        HashMap::from([("docs".to_string(), docs)])
    }

    #[test]
    fn expands_references_and_flattens_entries() {
        let registry = registry();
        let body = json!({
            "title": "Docs",
            "groups": [
                { "title": "Getting Started", "items": ["intro", "setup", "gone"] }
            ]
        });

        let (expanded, entries) = expand(
            registry.fields_of("navigation-bar").unwrap(),
            body.as_object().unwrap(),
            &titles(),
            "title",
        );

        assert_eq!(
            expanded["groups"][0]["items"][0],
            json!({ "collection": "docs", "relativePath": "intro", "title": "Introduction" })
        );
        assert_eq!(
            expanded["groups"][0]["items"][2],
            json!({ "relativePath": "gone", "missing": true })
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].trail, vec!["Getting Started".to_string()]);
        assert_eq!(entries[1].title, None);
        assert_eq!(entries[2].collection, None);
    }

    #[test]
    fn collects_only_referenced_targets() {
        let registry = registry();
        let body = json!({
            "title": "Docs",
            "groups": [
                { "title": "One", "items": ["intro", "setup"] },
                { "title": "Two", "items": ["intro"] }
            ]
        });

        let targets = referenced_paths(
            registry.fields_of("navigation-bar").unwrap(),
            body.as_object().unwrap(),
        );

        assert_eq!(
            targets,
            BTreeMap::from([(
                "docs".to_string(),
                BTreeSet::from(["intro".to_string(), "setup".to_string()])
            )])
        );
    }

    #[test]
    fn sources_include_referenced_collections() {
        let registry = registry();
        let sources = source_collections(
            &NavigationSpec::default(),
            registry.fields_of("navigation-bar").unwrap(),
        );

        assert_eq!(sources, vec!["navigation-bar".to_string(), "docs".to_string()]);
    }

    #[tokio::test]
    async fn invalidation_beats_stale_publish() {
        let index = NavigationIndex::new();
        let sources = vec!["navigation-bar".to_string(), "docs".to_string()];
        let key = IndexKey {
            revision: Revision::from("main"),
            collection: "navigation-bar".to_string(),
            relative_path: "nav.json".to_string(),
        };
        let view = Arc::new(IndexView {
            collection: key.collection.clone(),
            relative_path: key.relative_path.clone(),
            revision: key.revision.clone(),
            body: Body::new(),
            entries: Vec::new(),
        });

        let stamp = index.stamp(&sources);
        index.invalidate("docs");
        assert!(!index.publish(key.clone(), Arc::clone(&view), stamp).await);
        assert!(index.get(&key).await.is_none());

        let stamp = index.stamp(&sources);
        assert!(index.publish(key.clone(), view, stamp).await);
        assert!(index.get(&key).await.is_some());

        index.invalidate("authors");
        assert!(index.get(&key).await.is_some());

        index.invalidate("docs");
        assert!(index.get(&key).await.is_none());
    }
}
