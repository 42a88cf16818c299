//! Startup configuration.
//!
//! A [`DatabaseConfig`] picks the backend once, at process start. It can be built in code,
//! read from a TOML file, or read from the environment:
//!
//! | Variable                     | Meaning                                              |
//! |------------------------------|------------------------------------------------------|
//! | `DOCBASE_IS_LOCAL`           | `true` selects the in-memory backend                 |
//! | `MONGODB_URI`                | Connection string, required unless running locally   |
//! | `DOCBASE_MONGODB_DATABASE`   | Database name (default `docbase`)                    |
//! | `DOCBASE_MONGODB_COLLECTION` | Collection holding every entry (default `content`)   |
//! | `DOCBASE_BRANCH`             | Content branch; falls back to `VERCEL_GIT_COMMIT_REF`, then `HEAD`, then `main` |
//!
//! ```toml
//! branch = "main"
//!
//! [backend]
//! kind = "mongodb"
//! uri = "mongodb://localhost:27017"
//!
//! [retry]
//! attempts = 5
//! backoff_ms = 100
//! ```

use serde::{Deserialize, Serialize};

use docbase_core::{
    error::{ContentError, ContentResult},
    resolver::ResolverConfig,
};

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_DATABASE: &str = "docbase";
const DEFAULT_COLLECTION: &str = "content";

/// Which backend to connect to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process store; content lives as long as the process.
    #[default]
    Local,
    /// MongoDB deployment reached through a shared connection pool.
    Mongodb {
        uri: String,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default = "default_collection")]
        collection: String,
    },
}

/// Read retry settings for networked backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 50,
        }
    }
}

#[cfg(feature = "mongodb")]
impl RetrySettings {
    pub fn policy(&self) -> docbase_mongodb::RetryPolicy {
        docbase_mongodb::RetryPolicy::new(
            self.attempts,
            std::time::Duration::from_millis(self.backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: BackendConfig,
    /// Revision reported when no version provider is supplied.
    pub branch: String,
    pub retry: RetrySettings,
    pub resolver: ResolverConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Local,
            branch: DEFAULT_BRANCH.to_string(),
            retry: RetrySettings::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// A configuration for the in-memory backend.
    pub fn local() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> ContentResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable if set.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Configuration`] if the networked backend is selected but
    /// `MONGODB_URI` is not set. There is no fallback to the local backend.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ContentResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let is_local = var("DOCBASE_IS_LOCAL")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let backend = if is_local {
            BackendConfig::Local
        } else {
            BackendConfig::Mongodb {
                uri: var("MONGODB_URI").ok_or_else(|| {
                    ContentError::Configuration(
                        "MONGODB_URI is required unless DOCBASE_IS_LOCAL is true".to_string(),
                    )
                })?,
                database: var("DOCBASE_MONGODB_DATABASE").unwrap_or_else(default_database),
                collection: var("DOCBASE_MONGODB_COLLECTION").unwrap_or_else(default_collection),
            }
        };

        let branch = var("DOCBASE_BRANCH")
            .or_else(|| var("VERCEL_GIT_COMMIT_REF"))
            .or_else(|| var("HEAD"))
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        Ok(Self {
            backend,
            branch,
            ..Self::default()
        })
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(source: &str) -> ContentResult<Self> {
        toml::from_str(source).map_err(|e| ContentError::Configuration(e.to_string()))
    }
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}
