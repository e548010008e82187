//! Git source handler: shallow-clone the repository and read the registry
//! document from the working tree.
//!
//! libgit2 is blocking, so all repository work runs on the blocking pool.

use super::SourceHandler;
use crate::config::{Config, GitSource};
use crate::error::{Error, Result};
use crate::sources::format;
use crate::types::FetchResult;
use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{Direction, FetchOptions, Remote, Repository};
use std::path::Path;

#[derive(Default)]
pub struct GitSourceHandler;

impl GitSourceHandler {
    pub fn new() -> Self {
        Self
    }

    fn source<'a>(&self, config: &'a Config) -> Result<&'a GitSource> {
        config
            .source
            .git
            .as_ref()
            .ok_or_else(|| Error::Config("git source configuration missing".to_string()))
    }

    async fn read_document(&self, source: &GitSource) -> Result<Vec<u8>> {
        let url = source.url.clone();
        let git_ref = source.git_ref.clone();
        let path = source.path.clone();

        tokio::task::spawn_blocking(move || clone_and_read(&url, &git_ref, &path))
            .await
            .map_err(|e| Error::Server(format!("git task panicked: {}", e)))?
    }
}

fn clone_and_read(url: &str, git_ref: &str, path: &str) -> Result<Vec<u8>> {
    let workdir = tempfile::tempdir()?;

    let mut fetch = FetchOptions::new();
    fetch.depth(1);

    let repo = match RepoBuilder::new()
        .branch(git_ref)
        .fetch_options(fetch)
        .clone(url, workdir.path())
    {
        Ok(repo) => repo,
        // The ref may be a tag or a commit rather than a branch; retry with
        // a full clone and an explicit checkout.
        Err(err) => {
            tracing::debug!(%url, %git_ref, %err, "shallow branch clone failed, retrying full clone");
            clone_at_ref(url, git_ref, workdir.path())
                .map_err(|e| Error::SourceUnavailable(format!("cloning {}: {}", url, e)))?
        }
    };

    let file_path = repo
        .workdir()
        .ok_or_else(|| Error::SourceUnavailable("clone produced a bare repository".to_string()))?
        .join(path);

    let bytes = std::fs::read(&file_path).map_err(|e| {
        Error::FetchFailed(format!("{} not found in {}@{}: {}", path, url, git_ref, e))
    })?;

    drop(repo);
    Ok(bytes)
}

fn clone_at_ref(url: &str, git_ref: &str, into: &Path) -> std::result::Result<Repository, git2::Error> {
    let repo = Repository::clone(url, into)?;
    {
        let (object, reference) = repo.revparse_ext(git_ref)?;
        repo.checkout_tree(&object, None)?;
        match reference.and_then(|r| r.name().map(String::from)) {
            Some(name) => repo.set_head(&name)?,
            None => repo.set_head_detached(object.id())?,
        }
    }
    Ok(repo)
}

#[async_trait]
impl SourceHandler for GitSourceHandler {
    /// Reachability probe: connect to the remote without fetching objects.
    async fn validate(&self, config: &Config) -> Result<()> {
        let source = self.source(config)?;
        let url = source.url.clone();

        tokio::task::spawn_blocking(move || {
            let mut remote = Remote::create_detached(url.as_str())?;
            remote.connect(Direction::Fetch)?;
            remote.disconnect()?;
            Ok::<_, git2::Error>(())
        })
        .await
        .map_err(|e| Error::Server(format!("git task panicked: {}", e)))?
        .map_err(|e| Error::SourceUnavailable(format!("connecting to {}: {}", source.url, e)))
    }

    async fn fetch_registry(&self, config: &Config) -> Result<FetchResult> {
        let source = self.source(config)?;
        let bytes = self.read_document(source).await?;
        format::fetch_result_from_document(&bytes, config.source.format)
    }
}
