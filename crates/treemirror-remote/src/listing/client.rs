//! Hierarchical listing client
//!
//! `GET <endpoint>/?list=recursive` returns a JSON array describing every
//! entry below the endpoint:
//!
//! ```json
//! [
//!   {"path": "Content/Cards", "is_dir": true},
//!   {"path": "Content/Cards/a.png", "size": 1024, "modified": "2024-03-01T10:00:00Z"}
//! ]
//! ```
//!
//! Files are served at `GET <endpoint>/<path>`. Credentials, when present,
//! are sent as HTTP basic auth.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use tracing::debug;
use treemirror_core::domain::NodeRecord;
use treemirror_core::ports::Credentials;
use url::Url;

use crate::transfer::ByteStream;

/// Operations the listing backend needs from its server
#[async_trait::async_trait]
pub trait ListingClient: Send + Sync {
    /// Checks that the endpoint is reachable and accepts our credentials
    async fn probe(&self) -> Result<()>;

    /// Fetches the full recursive listing
    async fn fetch_listing(&self) -> Result<Vec<NodeRecord>>;

    /// Opens the content stream of the file at `path`
    async fn open_file(&self, path: &str) -> Result<ByteStream>;
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    path: String,
    #[serde(default)]
    size: u64,
    modified: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    is_dir: bool,
}

impl From<ListingEntry> for NodeRecord {
    fn from(entry: ListingEntry) -> Self {
        let path = entry.path.trim_matches('/').to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let record = if entry.is_dir {
            NodeRecord::directory(path, name)
        } else {
            NodeRecord::file(path, name, entry.size)
        };
        NodeRecord {
            modified: entry.modified,
            created: entry.created,
            ..record
        }
    }
}

/// reqwest-based [`ListingClient`]
pub struct HttpListingClient {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl HttpListingClient {
    pub fn new(base: Url, credentials: Option<Credentials>) -> Self {
        Self {
            client: Client::new(),
            base,
            credentials,
        }
    }

    /// Endpoint as a directory URL (trailing slash)
    fn directory_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("endpoint '{}' cannot hold paths", self.base))?
            .pop_if_empty()
            .push("");
        Ok(url)
    }

    fn file_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("endpoint '{}' cannot hold paths", self.base))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl ListingClient for HttpListingClient {
    async fn probe(&self) -> Result<()> {
        let url = self.directory_url()?;
        debug!(url = %url, "Probing listing endpoint");
        self.request(Method::HEAD, url)
            .send()
            .await
            .context("Failed to reach listing endpoint")?
            .error_for_status()
            .context("Listing endpoint returned error status")?;
        Ok(())
    }

    async fn fetch_listing(&self) -> Result<Vec<NodeRecord>> {
        let mut url = self.directory_url()?;
        url.set_query(Some("list=recursive"));
        debug!(url = %url, "Fetching recursive listing");

        let entries: Vec<ListingEntry> = self
            .request(Method::GET, url)
            .send()
            .await
            .context("Failed to fetch listing")?
            .error_for_status()
            .context("Listing request returned error status")?
            .json()
            .await
            .context("Failed to parse listing response")?;

        debug!(count = entries.len(), "Fetched listing");
        Ok(entries.into_iter().map(NodeRecord::from).collect())
    }

    async fn open_file(&self, path: &str) -> Result<ByteStream> {
        let url = self.file_url(path)?;
        let response = self
            .request(Method::GET, url)
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
