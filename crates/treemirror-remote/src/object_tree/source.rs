//! ObjectTreeSource - RemoteSource implementation for object-tree services
//!
//! ## Design Notes
//!
//! - Session token and memoized tree live behind a `tokio::sync::Mutex`;
//!   the lock is held across connect so concurrent callers never log in twice.
//! - Sessions are established in order: stored token, credentials, anonymous.
//!   A rejected stored token falls through to the next option.
//! - The endpoint must be `https://<service host>/...`; its last path segment
//!   is the handle of the shared root node.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use treemirror_core::domain::{RemoteNode, RemoteTree, UpdateError};
use treemirror_core::manifest::ManifestOptions;
use treemirror_core::ports::{Credentials, ProgressFn, RemoteSource};
use treemirror_core::retry::{retry, RetryPolicy};

use super::client::ObjectTreeClient;
use crate::cancellable;
use crate::session::{SessionStore, StoredSession};
use crate::transfer::{self, ByteStream};

#[derive(Default)]
struct State {
    session: Option<String>,
    tree: Option<Arc<RemoteTree>>,
}

/// Update source backed by an object-tree service
pub struct ObjectTreeSource {
    endpoint: String,
    root_handle: String,
    client: Arc<dyn ObjectTreeClient>,
    credentials: Option<Credentials>,
    session_store: Option<Arc<dyn SessionStore>>,
    options: ManifestOptions,
    retry: RetryPolicy,
    state: Mutex<State>,
}

impl ObjectTreeSource {
    /// Creates a source for `endpoint`, which must use `https` and name
    /// `service_host` as its host.
    pub fn new(
        endpoint: &str,
        service_host: &str,
        client: Arc<dyn ObjectTreeClient>,
    ) -> Result<Self, UpdateError> {
        let url = Url::parse(endpoint)
            .map_err(|e| UpdateError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
        if url.scheme() != "https" {
            return Err(UpdateError::Configuration(format!(
                "object-tree endpoint must use https, got '{}'",
                url.scheme()
            )));
        }
        let host = url.host_str().unwrap_or_default();
        if !host.eq_ignore_ascii_case(service_host) {
            return Err(UpdateError::Configuration(format!(
                "object-tree endpoint host '{host}' does not match service host '{service_host}'"
            )));
        }

        let root_handle = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            endpoint: endpoint.to_string(),
            root_handle,
            client,
            credentials: None,
            session_store: None,
            options: ManifestOptions::with_priority(10),
            retry: RetryPolicy::REMOTE,
            state: Mutex::new(State::default()),
        })
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_manifest_options(mut self, options: ManifestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle of the shared root node, empty for the account root
    pub fn root_handle(&self) -> &str {
        &self.root_handle
    }

    /// Current session token, if connected
    pub async fn session_token(&self) -> Option<String> {
        self.state.lock().await.session.clone()
    }

    /// Key under which the session token is persisted
    fn account_key(&self) -> String {
        let user = self
            .credentials
            .as_ref()
            .map_or("anonymous", |c| c.username.as_str());
        format!("{user}@{}", self.endpoint)
    }

    fn load_stored_token(&self) -> Option<String> {
        let store = self.session_store.as_ref()?;
        match store.load(&self.account_key()) {
            Ok(session) => session.map(|s| s.token),
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                None
            }
        }
    }

    fn persist_token(&self, token: &str) {
        if let Some(store) = &self.session_store {
            if let Err(e) = store.store(&self.account_key(), &StoredSession::new(token)) {
                warn!(error = %e, "Failed to persist session");
            }
        }
    }

    async fn establish_session(
        &self,
        stored: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, UpdateError> {
        cancellable(cancel, async {
            if let Some(token) = stored {
                match self.client.resume_session(token).await {
                    Ok(session) => return Ok(session),
                    Err(e) => warn!(error = %e, "Stored session rejected"),
                }
            }
            let session = match &self.credentials {
                Some(credentials) => self.client.login(credentials).await,
                None => self.client.login_anonymous().await,
            };
            session.map_err(UpdateError::Connection)
        })
        .await
    }

    async fn ensure_session(
        &self,
        state: &mut State,
        cancel: &CancellationToken,
    ) -> Result<String, UpdateError> {
        if let Some(session) = &state.session {
            return Ok(session.clone());
        }

        let stored = self.load_stored_token();
        let stored = stored.as_deref();
        let session = retry("connect", self.retry, cancel, move || {
            self.establish_session(stored, cancel)
        })
        .await?;

        self.persist_token(&session);
        info!(endpoint = %self.endpoint, "Connected to object-tree service");
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn open(
        &self,
        node: &RemoteNode,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, UpdateError> {
        let session = {
            let mut state = self.state.lock().await;
            self.ensure_session(&mut state, cancel).await?
        };
        cancellable(cancel, async {
            self.client
                .open_content(&session, &node.key)
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
impl RemoteSource for ObjectTreeSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn manifest_options(&self) -> ManifestOptions {
        self.options
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), UpdateError> {
        let mut state = self.state.lock().await;
        self.ensure_session(&mut state, cancel).await.map(|_| ())
    }

    async fn list_tree(&self, cancel: &CancellationToken) -> Result<Arc<RemoteTree>, UpdateError> {
        let mut state = self.state.lock().await;
        if let Some(tree) = &state.tree {
            return Ok(Arc::clone(tree));
        }

        let session = self.ensure_session(&mut state, cancel).await?;
        let session = session.as_str();
        let records = retry("list", self.retry, cancel, move || async move {
            cancellable(cancel, async {
                self.client
                    .fetch_nodes(session, &self.root_handle)
                    .await
                    .map_err(UpdateError::Listing)
            })
            .await
        })
        .await?;

        let tree = Arc::new(RemoteTree::from_parent_links(records)?);
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
        let stream = self.open(node, &PathBuf::from(&node.name), cancel).await?;
        transfer::read_to_vec(&node.name, stream, cancel).await
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
