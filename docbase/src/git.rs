//! Version provider backed by a git repository.
//!
//! The current revision is the checked-out branch (or the commit id when `HEAD` is detached),
//! and history blobs are read from the tree of any revision `git rev-parse` understands.
//! Repository access is blocking and runs on tokio's blocking pool.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use git2::{ErrorCode, ObjectType, Repository};
use tracing::debug;

use docbase_core::{
    error::{ContentError, ContentResult},
    version::{Revision, VersionProvider},
};

/// Reads revisions and blobs from a local git repository.
pub struct GitVersionProvider {
    repo: Arc<Mutex<Repository>>,
    root: PathBuf,
}

impl std::fmt::Debug for GitVersionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitVersionProvider")
            .field("root", &self.root)
            .finish()
    }
}

impl GitVersionProvider {
    /// Opens the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Configuration`] if `path` is not inside a git repository.
    pub fn open(path: impl AsRef<Path>) -> ContentResult<Self> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|e| {
            ContentError::Configuration(format!(
                "not a git repository: {} ({})",
                path.display(),
                e.message()
            ))
        })?;
        let root = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();

        Ok(Self {
            repo: Arc::new(Mutex::new(repo)),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn with_repo<T, F>(&self, call: F) -> ContentResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> ContentResult<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);

        tokio::task::spawn_blocking(move || {
            let repo = repo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            call(&repo)
        })
        .await
        .map_err(|e| ContentError::BackendUnavailable(format!("git: {e}")))?
    }
}

fn unavailable(err: git2::Error) -> ContentError {
    ContentError::BackendUnavailable(format!("git: {}", err.message()))
}

fn head_revision(repo: &Repository) -> ContentResult<Revision> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            return Err(ContentError::Configuration(
                "repository has no commits yet".to_string(),
            ));
        }
        Err(e) => return Err(unavailable(e)),
    };

    if head.is_branch() {
        if let Some(name) = head.shorthand() {
            return Ok(Revision::from(name));
        }
    }

    let commit = head.peel_to_commit().map_err(unavailable)?;
    Ok(Revision::new(commit.id().to_string()))
}

fn read_blob(repo: &Repository, revision: &Revision, path: &str) -> ContentResult<Vec<u8>> {
    let not_found = || ContentError::not_found(format!("history@{revision}"), path);

    let object = match repo.revparse_single(revision.as_str()) {
        Ok(object) => object,
        Err(e) if e.code() == ErrorCode::NotFound => return Err(not_found()),
        Err(e) => return Err(unavailable(e)),
    };
    let tree = object
        .peel_to_commit()
        .and_then(|commit| commit.tree())
        .map_err(unavailable)?;

    let entry = match tree.get_path(Path::new(path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Err(not_found()),
        Err(e) => return Err(unavailable(e)),
    };
    // Directories and submodules have no blob content.
    if entry.kind() != Some(ObjectType::Blob) {
        return Err(not_found());
    }
    let blob = repo.find_blob(entry.id()).map_err(unavailable)?;

    debug!(revision = revision.as_str(), path, bytes = blob.size(), "read history blob");
    Ok(blob.content().to_vec())
}

#[async_trait]
impl VersionProvider for GitVersionProvider {
    async fn current_revision(&self) -> ContentResult<Revision> {
        self.with_repo(head_revision).await
    }

    async fn blob_at(&self, revision: &Revision, path: &str) -> ContentResult<Vec<u8>> {
        let revision = revision.clone();
        let path = path.to_string();

        self.with_repo(move |repo| read_blob(repo, &revision, &path))
            .await
    }
}
