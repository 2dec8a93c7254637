//! Object-tree API client
//!
//! The object-tree service exposes a flat node listing where every node
//! names its parent by handle. Sessions are bearer tokens obtained by
//! resuming a stored token, logging in, or logging in anonymously.
//!
//! ## Endpoints
//!
//! | Method | Path | Body / query | Response |
//! |---|---|---|---|
//! | POST | `/session/resume` | `{"token"}` | `{"token"}` |
//! | POST | `/session/login` | `{"username","password"}` | `{"token"}` |
//! | POST | `/session/anonymous` | `{}` | `{"token"}` |
//! | GET | `/nodes` | `?root=<handle>` | `{"nodes":[...]}` |
//! | GET | `/nodes/{id}/content` | | raw bytes |

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use treemirror_core::domain::{NodeKind, NodeRecord};
use treemirror_core::ports::Credentials;

use crate::transfer::ByteStream;

/// Operations the object-tree backend needs from its service
#[async_trait::async_trait]
pub trait ObjectTreeClient: Send + Sync {
    /// Exchanges a previously stored token for a live session token
    async fn resume_session(&self, token: &str) -> Result<String>;

    /// Logs in with credentials, returning a session token
    async fn login(&self, credentials: &Credentials) -> Result<String>;

    /// Opens an anonymous session, returning a session token
    async fn login_anonymous(&self) -> Result<String>;

    /// Fetches every node below (and including) the node `root_handle`.
    /// An empty handle lists the account root.
    async fn fetch_nodes(&self, session: &str, root_handle: &str) -> Result<Vec<NodeRecord>>;

    /// Opens the content stream of one file node
    async fn open_content(&self, session: &str, node_key: &str) -> Result<ByteStream>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResumeRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: Vec<NodeResponse>,
}

/// One node of the flat listing
#[derive(Debug, Deserialize)]
struct NodeResponse {
    id: String,
    parent: Option<String>,
    name: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    size: u64,
    modified: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
}

impl From<NodeResponse> for NodeRecord {
    fn from(node: NodeResponse) -> Self {
        NodeRecord {
            key: node.id,
            name: node.name,
            kind: node.kind,
            size: if node.kind == NodeKind::File { node.size } else { 0 },
            modified: node.modified,
            created: node.created,
            parent_key: node.parent,
        }
    }
}

// ============================================================================
// HttpObjectTreeClient
// ============================================================================

/// reqwest-based [`ObjectTreeClient`]
pub struct HttpObjectTreeClient {
    client: Client,
    base_url: String,
}

impl HttpObjectTreeClient {
    /// Creates a client for the API of `service_host`
    pub fn new(service_host: &str) -> Self {
        Self::with_base_url(format!("https://{service_host}/api"))
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    async fn open_session<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let response: SessionResponse = self
            .request(Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST {path}"))?
            .error_for_status()
            .with_context(|| format!("POST {path} returned error status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {path} response"))?;
        Ok(response.token)
    }
}

#[async_trait::async_trait]
impl ObjectTreeClient for HttpObjectTreeClient {
    async fn resume_session(&self, token: &str) -> Result<String> {
        debug!("Resuming stored session");
        self.open_session("/session/resume", &ResumeRequest { token })
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<String> {
        debug!(username = %credentials.username, "Logging in");
        self.open_session(
            "/session/login",
            &LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            },
        )
        .await
    }

    async fn login_anonymous(&self) -> Result<String> {
        debug!("Opening anonymous session");
        self.open_session("/session/anonymous", &serde_json::json!({}))
            .await
    }

    async fn fetch_nodes(&self, session: &str, root_handle: &str) -> Result<Vec<NodeRecord>> {
        debug!(root = root_handle, "Fetching node listing");
        let response: NodesResponse = self
            .request(Method::GET, "/nodes")
            .query(&[("root", root_handle)])
            .bearer_auth(session)
            .send()
            .await
            .context("Failed to fetch /nodes")?
            .error_for_status()
            .context("GET /nodes returned error status")?
            .json()
            .await
            .context("Failed to parse /nodes response")?;

        debug!(count = response.nodes.len(), "Fetched node listing");
        Ok(response.nodes.into_iter().map(NodeRecord::from).collect())
    }

    async fn open_content(&self, session: &str, node_key: &str) -> Result<ByteStream> {
        let path = format!("/nodes/{node_key}/content");
        let response = self
            .request(Method::GET, &path)
            .bearer_auth(session)
            .send()
            .await
            .context("Failed to send download request")?
            .error_for_status()
            .context("Download request returned error status")?;

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.context("Failed to read download response body")),
        ))
    }
}
