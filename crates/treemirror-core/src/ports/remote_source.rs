//! Remote source port (driven/secondary port)
//!
//! This module defines the interface every update backend implements. A
//! backend owns one connection/session to one remote endpoint, a memoized
//! snapshot of its tree, and byte-level download.
//!
//! ## Design Notes
//!
//! - Uses `UpdateError` rather than `anyhow::Result` so the engine can tell
//!   configuration, resolution, transient and transfer failures apart.
//! - Uses `#[async_trait]` so sources can be shared as `Arc<dyn RemoteSource>`
//!   by the update items that download through them.
//! - Implementations serialize their own state; callers must not issue
//!   concurrent top-level calls against one instance.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::{RemoteNode, RemoteTree, UpdateError};
use crate::manifest::ManifestOptions;

/// Progress callback receiving `(bytes_transferred, total_bytes)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Username/password pair for credentialed login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Port trait for one remote update source
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    /// Endpoint this source was constructed for, for display and logging
    fn endpoint(&self) -> &str;

    /// Parameters for parsing this source's manifest
    fn manifest_options(&self) -> ManifestOptions;

    /// Establishes the session if not already connected.
    ///
    /// Preference order: stored session token, credentialed login, anonymous
    /// login. Transient failures are retried; exhausting the budget returns
    /// [`UpdateError::Connection`].
    async fn connect(&self, cancel: &CancellationToken) -> Result<(), UpdateError>;

    /// Returns the full recursive snapshot of the remote tree.
    ///
    /// The snapshot is fetched once and memoized until [`invalidate`](Self::invalidate).
    async fn list_tree(&self, cancel: &CancellationToken) -> Result<Arc<RemoteTree>, UpdateError>;

    /// Drops the memoized snapshot so the next [`list_tree`](Self::list_tree)
    /// fetches a fresh one
    async fn invalidate(&self);

    /// Reads a small remote file (such as the manifest) into memory
    async fn read_bytes(
        &self,
        node: &RemoteNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError>;

    /// Streams a remote file to `destination`.
    ///
    /// Creates the destination directory, removes any existing file first,
    /// and removes the partially written file again if the transfer fails or
    /// is cancelled.
    async fn download(
        &self,
        node: &RemoteNode,
        destination: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError>;
}
