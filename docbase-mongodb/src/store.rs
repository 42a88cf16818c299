use async_trait::async_trait;
use bson::{Binary, Bson, Document, doc, spec::BinarySubtype};
use futures::{StreamExt, TryStreamExt, stream};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, IndexOptions},
};
use tracing::info;

use docbase_core::{
    backend::{KvBackend, KvBackendBuilder, KvEntry, KvStream},
    error::{ContentError, ContentResult},
};

use crate::{
    retry::{RetryPolicy, is_transient, with_retry},
    sanitizer::PatternSanitizer,
};

/// Key-value backend storing every bucket in one MongoDB collection.
///
/// Each entry is a document `{ bucket, key, value }` with `value` holding the raw bytes as
/// generic binary. A unique index on `(bucket, key)` is created when the store is built.
///
/// The [`Client`] is a shared connection pool; clone the store rather than building a second one.
#[derive(Debug, Clone)]
pub struct MongoKvStore {
    client: Client,
    collection: MongoCollection<Document>,
    retry: RetryPolicy,
}

impl MongoKvStore {
    pub fn new(client: Client, database: &str, collection: &str, retry: RetryPolicy) -> Self {
        let collection = client.database(database).collection(collection);

        Self {
            client,
            collection,
            retry,
        }
    }

    pub fn builder(uri: &str, database: &str, collection: &str) -> MongoKvStoreBuilder {
        MongoKvStoreBuilder::new(uri, database, collection)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn ensure_index(&self) -> ContentResult<()> {
        let collection = &self.collection;
        with_retry(&self.retry, "create_index", is_transient, || async move {
            collection
                .create_index(
                    IndexModel::builder()
                        .keys(doc! { "bucket": 1, "key": 1 })
                        .options(IndexOptions::builder().unique(true).build())
                        .build(),
                )
                .await
        })
        .await?;

        Ok(())
    }
}

fn entry_filter(bucket: &str, relative_path: &str) -> Document {
    doc! { "bucket": bucket, "key": relative_path }
}

fn prefix_filter(bucket: &str, prefix: &str) -> Document {
    if prefix.is_empty() {
        doc! { "bucket": bucket }
    } else {
        doc! {
            "bucket": bucket,
            "key": { "$regex": PatternSanitizer::prefix_pattern(prefix) },
        }
    }
}

fn decode_value(document: &Document) -> ContentResult<Vec<u8>> {
    match document.get("value") {
        Some(Bson::Binary(binary)) => Ok(binary.bytes.clone()),
        _ => Err(ContentError::Serialization(
            "stored entry has no binary value".to_string(),
        )),
    }
}

fn decode_entry(document: &Document) -> ContentResult<KvEntry> {
    let relative_path = match document.get("key") {
        Some(Bson::String(key)) => key.clone(),
        _ => {
            return Err(ContentError::Serialization(
                "stored entry has no key".to_string(),
            ));
        }
    };

    Ok(KvEntry {
        relative_path,
        value: decode_value(document)?,
    })
}

#[async_trait]
impl KvBackend for MongoKvStore {
    async fn get(&self, bucket: &str, relative_path: &str) -> ContentResult<Option<Vec<u8>>> {
        let collection = &self.collection;
        let filter = entry_filter(bucket, relative_path);

        let found = with_retry(&self.retry, "get", is_transient, || {
            let filter = filter.clone();
            async move { collection.find_one(filter).await }
        })
        .await?;

        found.as_ref().map(decode_value).transpose()
    }

    async fn put(&self, bucket: &str, relative_path: &str, value: Vec<u8>) -> ContentResult<()> {
        let entry = doc! {
            "bucket": bucket,
            "key": relative_path,
            "value": Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: value,
            }),
        };

        self.collection
            .replace_one(entry_filter(bucket, relative_path), entry)
            .upsert(true)
            .await
            .map_err(|e| ContentError::BackendUnavailable(format!("put: {e}")))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, relative_path: &str) -> ContentResult<()> {
        self.collection
            .delete_one(entry_filter(bucket, relative_path))
            .await
            .map_err(|e| ContentError::BackendUnavailable(format!("delete: {e}")))?;

        Ok(())
    }

    fn iterate<'a>(&'a self, bucket: &str, prefix: &str) -> KvStream<'a> {
        let filter = prefix_filter(bucket, prefix);

        stream::once(async move {
            let collection = &self.collection;
            let cursor = with_retry(&self.retry, "iterate", is_transient, || {
                let filter = filter.clone();
                async move { collection.find(filter).sort(doc! { "key": 1 }).await }
            })
            .await?;

            Ok::<_, ContentError>(cursor.map(|document| {
                document
                    .map_err(|e| ContentError::BackendUnavailable(format!("iterate: {e}")))
                    .and_then(|document| decode_entry(&document))
            }))
        })
        .try_flatten()
        .boxed()
    }

    async fn shutdown(self) -> ContentResult<()> {
        self.client.shutdown().await;
        info!("mongodb client shut down");

        Ok(())
    }
}

/// Builder for [`MongoKvStore`]: parses the connection string, connects and ensures the index.
pub struct MongoKvStoreBuilder {
    uri: String,
    database: String,
    collection: String,
    retry: RetryPolicy,
}

impl MongoKvStoreBuilder {
    pub fn new(uri: &str, database: &str, collection: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the read retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Parses `uri` with the driver's own retries switched off; [`RetryPolicy`] is the only one.
async fn client_options(uri: &str) -> ContentResult<ClientOptions> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| ContentError::Configuration(e.to_string()))?;
    options.retry_reads = Some(false);
    options.retry_writes = Some(false);

    Ok(options)
}

#[async_trait]
impl KvBackendBuilder for MongoKvStoreBuilder {
    type Backend = MongoKvStore;

    async fn build(self) -> ContentResult<Self::Backend> {
        let store = MongoKvStore::new(
            Client::with_options(client_options(&self.uri).await?)
                .map_err(|e| ContentError::Configuration(e.to_string()))?,
            &self.database,
            &self.collection,
            self.retry,
        );

        store.ensure_index().await?;
        info!(
            database = %self.database,
            collection = %self.collection,
            "connected to mongodb"
        );

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_scope_by_bucket_and_escaped_prefix() {
        assert_eq!(
            prefix_filter("main~docs", "v1.0/"),
            doc! { "bucket": "main~docs", "key": { "$regex": "^v1\\.0/" } }
        );
        assert_eq!(prefix_filter("main~docs", ""), doc! { "bucket": "main~docs" });
        assert_eq!(
            entry_filter("main~docs", "intro.md"),
            doc! { "bucket": "main~docs", "key": "intro.md" }
        );
    }

    #[test]
    fn decodes_stored_entries() {
        let stored = doc! {
            "bucket": "main~docs",
            "key": "intro.md",
            "value": Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: b"{}".to_vec() }),
        };

        assert_eq!(
            decode_entry(&stored).unwrap(),
            KvEntry {
                relative_path: "intro.md".to_string(),
                value: b"{}".to_vec()
            }
        );
        assert!(matches!(
            decode_value(&doc! { "key": "intro.md" }),
            Err(ContentError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn driver_retries_are_disabled() {
        let options = client_options("mongodb://localhost:27017/?retryWrites=true")
            .await
            .unwrap();

        assert_eq!(options.retry_reads, Some(false));
        assert_eq!(options.retry_writes, Some(false));
    }

    #[tokio::test]
    async fn malformed_uri_is_a_configuration_error() {
        let err = MongoKvStore::builder("not-a-uri", "db", "entries")
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::Configuration(_)));
    }
}
