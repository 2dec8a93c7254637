//! ListingSource - RemoteSource implementation for hierarchical listings

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use treemirror_core::domain::{RemoteNode, RemoteTree, UpdateError};
use treemirror_core::manifest::ManifestOptions;
use treemirror_core::ports::{Credentials, ProgressFn, RemoteSource};
use treemirror_core::retry::{retry, RetryPolicy};

use super::client::{HttpListingClient, ListingClient};
use crate::cancellable;
use crate::transfer::{self, ByteStream};

#[derive(Default)]
struct State {
    connected: bool,
    tree: Option<Arc<RemoteTree>>,
}

/// Update source backed by an HTTP server publishing a recursive listing
pub struct ListingSource {
    endpoint: String,
    client: Arc<dyn ListingClient>,
    options: ManifestOptions,
    retry: RetryPolicy,
    state: Mutex<State>,
}

fn parse_endpoint(endpoint: &str) -> Result<Url, UpdateError> {
    let url = Url::parse(endpoint)
        .map_err(|e| UpdateError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UpdateError::Configuration(format!(
            "listing endpoint must use http or https, got '{other}'"
        ))),
    }
}

impl ListingSource {
    /// Creates a source for `endpoint` served through `client`
    pub fn new(endpoint: &str, client: Arc<dyn ListingClient>) -> Result<Self, UpdateError> {
        parse_endpoint(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            options: ManifestOptions::with_priority(1),
            retry: RetryPolicy::REMOTE,
            state: Mutex::new(State::default()),
        })
    }

    /// Creates a source with an [`HttpListingClient`]; anonymous when
    /// `credentials` is `None`
    pub fn from_endpoint(
        endpoint: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, UpdateError> {
        let url = parse_endpoint(endpoint)?;
        Self::new(endpoint, Arc::new(HttpListingClient::new(url, credentials)))
    }

    pub fn with_manifest_options(mut self, options: ManifestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn ensure_connected(
        &self,
        state: &mut State,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        if state.connected {
            return Ok(());
        }
        retry("connect", self.retry, cancel, move || async move {
            cancellable(cancel, async {
                self.client.probe().await.map_err(UpdateError::Connection)
            })
            .await
        })
        .await?;

        info!(endpoint = %self.endpoint, "Connected to listing server");
        state.connected = true;
        Ok(())
    }

    async fn open(
        &self,
        node: &RemoteNode,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, UpdateError> {
        {
            let mut state = self.state.lock().await;
            self.ensure_connected(&mut state, cancel).await?;
        }
        cancellable(cancel, async {
            self.client
                .open_file(&node.key)
                .await
                .map_err(|source| UpdateError::Transfer {
                    path: path.to_path_buf(),
                    source,
                })
        })
        .await
    }
}

#[async_trait::async_trait]
impl RemoteSource for ListingSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn manifest_options(&self) -> ManifestOptions {
        self.options
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), UpdateError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state, cancel).await
    }

    async fn list_tree(&self, cancel: &CancellationToken) -> Result<Arc<RemoteTree>, UpdateError> {
        let mut state = self.state.lock().await;
        if let Some(tree) = &state.tree {
            return Ok(Arc::clone(tree));
        }
        self.ensure_connected(&mut state, cancel).await?;

        let records = retry("list", self.retry, cancel, move || async move {
            cancellable(cancel, async {
                self.client.fetch_listing().await.map_err(UpdateError::Listing)
            })
            .await
        })
        .await?;

        let tree = Arc::new(RemoteTree::from_paths(records));
        info!(endpoint = %self.endpoint, nodes = tree.len(), "Fetched remote tree");
        state.tree = Some(Arc::clone(&tree));
        Ok(tree)
    }

    async fn invalidate(&self) {
        debug!(endpoint = %self.endpoint, "Dropping memoized tree");
        self.state.lock().await.tree = None;
    }

    async fn read_bytes(
        &self,
        node: &RemoteNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError> {
        let stream = self.open(node, &PathBuf::from(&node.key), cancel).await?;
        transfer::read_to_vec(&node.key, stream, cancel).await
    }

    async fn download(
        &self,
        node: &RemoteNode,
        destination: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        let stream = self.open(node, destination, cancel).await?;
        transfer::write_stream(destination, node.size, stream, progress, cancel).await?;
        Ok(())
    }
}
