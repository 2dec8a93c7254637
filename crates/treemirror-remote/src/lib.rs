//! treemirror Remote - update source backends
//!
//! Provides [`RemoteSource`] implementations for:
//! - Object-tree APIs with flat, parent-indexed listings and session tokens
//! - Hierarchical HTTP listings
//! - Local or mounted directories (`file://`)
//!
//! ## Modules
//!
//! - [`object_tree`] - Object-tree backend and its HTTP/JSON client
//! - [`listing`] - Hierarchical listing backend and its HTTP/JSON client
//! - [`directory`] - Local directory backend
//! - [`session`] - Session token persistence (system keyring)
//! - [`transfer`] - Streaming writes with partial-file cleanup

pub mod directory;
pub mod listing;
pub mod object_tree;
pub mod session;
pub mod transfer;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use treemirror_core::config::{SourceConfig, SourceKind};
use treemirror_core::domain::UpdateError;
use treemirror_core::ports::RemoteSource;
use treemirror_core::retry::RetryPolicy;

pub use directory::DirectorySource;
pub use listing::{HttpListingClient, ListingClient, ListingSource};
pub use object_tree::{HttpObjectTreeClient, ObjectTreeClient, ObjectTreeSource};
pub use session::{KeyringSessionStore, MemorySessionStore, SessionStore};

/// Builds the backend described by one configured source.
///
/// Object-tree sources persist their session token in the system keyring.
pub fn build_source(
    config: &SourceConfig,
    retry: RetryPolicy,
) -> Result<Arc<dyn RemoteSource>, UpdateError> {
    let options = config.manifest_options();
    let credentials = config.credentials();

    let source: Arc<dyn RemoteSource> = match config.kind {
        SourceKind::ObjectTree => {
            let host = config
                .service_host
                .as_deref()
                .unwrap_or(object_tree::DEFAULT_SERVICE_HOST);
            let client = Arc::new(HttpObjectTreeClient::new(host));
            Arc::new(
                ObjectTreeSource::new(&config.endpoint, host, client)?
                    .with_credentials(credentials)
                    .with_session_store(Arc::new(KeyringSessionStore))
                    .with_manifest_options(options)
                    .with_retry_policy(retry),
            )
        }
        SourceKind::Listing => Arc::new(
            ListingSource::from_endpoint(&config.endpoint, credentials)?
                .with_manifest_options(options)
                .with_retry_policy(retry),
        ),
        SourceKind::Directory => Arc::new(
            DirectorySource::new(&config.endpoint)?
                .with_manifest_options(options)
                .with_retry_policy(retry),
        ),
    };
    Ok(source)
}

/// Races `fut` against the cancellation token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, UpdateError>
where
    F: Future<Output = Result<T, UpdateError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(UpdateError::Cancelled),
        result = fut => result,
    }
}
