//! DirectorySource - RemoteSource implementation for local or mounted directories
//!
//! The endpoint is a `file://` URI. Listing walks the directory with
//! `tokio::fs`; downloads copy through the shared transfer helper so the
//! partial-file guarantees hold here too.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use treemirror_core::domain::{NodeRecord, RemoteNode, RemoteTree, UpdateError};
use treemirror_core::manifest::ManifestOptions;
use treemirror_core::ports::{ProgressFn, RemoteSource};
use treemirror_core::retry::{retry, RetryPolicy};

use crate::cancellable;
use crate::transfer::{self, ByteStream};

#[derive(Default)]
struct State {
    tree: Option<Arc<RemoteTree>>,
}

/// Update source reading from a directory on this machine
pub struct DirectorySource {
    endpoint: String,
    root: PathBuf,
    options: ManifestOptions,
    retry: RetryPolicy,
    state: Mutex<State>,
}

impl DirectorySource {
    pub fn new(endpoint: &str) -> Result<Self, UpdateError> {
        let url = Url::parse(endpoint)
            .map_err(|e| UpdateError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
        if url.scheme() != "file" {
            return Err(UpdateError::Configuration(format!(
                "directory endpoint must use file, got '{}'",
                url.scheme()
            )));
        }
        let root = url.to_file_path().map_err(|_| {
            UpdateError::Configuration(format!("endpoint '{endpoint}' is not a local path"))
        })?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            root,
            options: ManifestOptions::with_priority(1),
            retry: RetryPolicy::REMOTE,
            state: Mutex::new(State::default()),
        })
    }

    pub fn with_manifest_options(mut self, options: ManifestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    async fn check_root(&self) -> anyhow::Result<()> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Cannot access {}", self.root.display()))?;
        anyhow::ensure!(metadata.is_dir(), "{} is not a directory", self.root.display());
        Ok(())
    }

    async fn walk(&self, cancel: &CancellationToken) -> Result<Vec<NodeRecord>, UpdateError> {
        let mut records = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];
        let mut visited = HashSet::new();

        while let Some((dir, prefix)) = pending.pop() {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            // Linked directories can point back at an ancestor
            let canonical = tokio::fs::canonicalize(&dir).await.unwrap_or_else(|_| dir.clone());
            if !visited.insert(canonical) {
                debug!(path = %dir.display(), "Skipping already visited directory");
                continue;
            }
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))
                .map_err(UpdateError::Listing)?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))
                .map_err(UpdateError::Listing)?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                let metadata = match tokio::fs::metadata(entry.path()).await {
                    Ok(metadata) => metadata,
                    // Dangling link
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => entry
                        .metadata()
                        .await
                        .with_context(|| format!("Failed to stat {}", entry.path().display()))
                        .map_err(UpdateError::Listing)?,
                    Err(e) => {
                        return Err(UpdateError::Listing(anyhow::Error::new(e).context(format!(
                            "Failed to stat {}",
                            entry.path().display()
                        ))))
                    }
                };

                let record = if metadata.is_dir() {
                    pending.push((entry.path(), key.clone()));
                    NodeRecord::directory(key, name)
                } else {
                    NodeRecord::file(key, name, metadata.len())
                };
                records.push(NodeRecord {
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                    created: metadata.created().ok().map(DateTime::<Utc>::from),
                    ..record
                });
            }
        }

        Ok(records)
    }

    async fn open(&self, node: &RemoteNode, path: &Path) -> Result<ByteStream, UpdateError> {
        let file_path = self.local_path(&node.key);
        let file = tokio::fs::File::open(&file_path)
            .await
            .with_context(|| format!("Failed to open {}", file_path.display()))
            .map_err(|source| UpdateError::Transfer {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Box::pin(
            ReaderStream::new(file).map(|chunk| chunk.map_err(anyhow::Error::from)),
        ))
    }
}

#[async_trait::async_trait]
impl RemoteSource for DirectorySource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn manifest_options(&self) -> ManifestOptions {
        self.options
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), UpdateError> {
        retry("connect", self.retry, cancel, move || async move {
            cancellable(cancel, async {
                self.check_root().await.map_err(UpdateError::Connection)
            })
            .await
        })
        .await
    }

    async fn list_tree(&self, cancel: &CancellationToken) -> Result<Arc<RemoteTree>, UpdateError> {
        let mut state = self.state.lock().await;
        if let Some(tree) = &state.tree {
            return Ok(Arc::clone(tree));
        }

        let records = retry("list", self.retry, cancel, move || self.walk(cancel)).await?;
        let tree = Arc::new(RemoteTree::from_paths(records));
        info!(root = %self.root.display(), nodes = tree.len(), "Scanned source directory");
        state.tree = Some(Arc::clone(&tree));
        Ok(tree)
    }

    async fn invalidate(&self) {
        debug!(root = %self.root.display(), "Dropping memoized tree");
        self.state.lock().await.tree = None;
    }

    async fn read_bytes(
        &self,
        node: &RemoteNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError> {
        let stream = self.open(node, &PathBuf::from(&node.key)).await?;
        transfer::read_to_vec(&node.key, stream, cancel).await
    }

    async fn download(
        &self,
        node: &RemoteNode,
        destination: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        let stream = self.open(node, destination).await?;
        transfer::write_stream(destination, node.size, stream, progress, cancel).await?;
        Ok(())
    }
}
