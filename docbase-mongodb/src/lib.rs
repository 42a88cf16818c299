//! MongoDB backend implementation for docbase.
//!
//! This crate provides a MongoDB-based implementation of the `KvBackend` trait, used when content
//! must survive restarts and be shared between processes.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docbase = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Entries are stored in a single MongoDB collection
//! - **Ordered prefix scans** - Served by a `(bucket, key)` index and streamed from the cursor
//! - **Bounded read retry** - Reads retry transient connection failures; writes never retry
//!
//! # Example
//!
//! ```ignore
//! use docbase::{backend::KvBackendBuilder, mongodb::MongoKvStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoKvStore::builder("mongodb://localhost:27017", "docbase", "entries")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbase_mongodb;

pub mod retry;
pub mod store;

mod sanitizer;

pub use retry::RetryPolicy;
pub use store::{MongoKvStore, MongoKvStoreBuilder};
