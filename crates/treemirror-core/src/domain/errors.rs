//! Domain error types
//!
//! Every failure the engine can surface is an [`UpdateError`]. Callers decide
//! whether to retry, skip a rule, or abort by looking at [`UpdateError::kind`]
//! instead of matching on messages.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of an [`UpdateError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad endpoint, unknown versioning mode, malformed manifest record.
    /// Never retried.
    Configuration,
    /// The manifest or a server path could not be found. Fatal for one rule
    /// (or for one source when the manifest is missing).
    Resolution,
    /// Connect or listing failures, retried a bounded number of times.
    TransientIo,
    /// A transfer or local filesystem operation failed.
    Transfer,
    /// The operation was cancelled through its cancellation token.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Resolution => "resolution",
            Self::TransientIo => "transient_io",
            Self::Transfer => "transfer",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors produced while resolving, reconciling, or applying updates
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Invalid configuration detected at construction or setup time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The update manifest is absent from the remote root
    #[error("Update manifest not found: {0}")]
    ManifestMissing(String),

    /// A segment of a rule's server path does not exist on the remote
    #[error("Server path not found: {0}")]
    ServerPathNotFound(String),

    /// Connecting to the remote failed after all retries
    #[error("Failed to connect: {0:#}")]
    Connection(#[source] anyhow::Error),

    /// Listing the remote tree failed after all retries
    #[error("Failed to list remote tree: {0:#}")]
    Listing(#[source] anyhow::Error),

    /// Downloading a remote file failed mid-stream
    #[error("Transfer failed for {}: {source:#}", path.display())]
    Transfer {
        /// Destination of the failed transfer
        path: PathBuf,
        /// Underlying client error
        #[source]
        source: anyhow::Error,
    },

    /// A local filesystem operation failed
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path the operation touched
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl UpdateError {
    /// Classifies this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ManifestMissing(_) | Self::ServerPathNotFound(_) => ErrorKind::Resolution,
            Self::Connection(_) | Self::Listing(_) => ErrorKind::TransientIo,
            Self::Transfer { .. } | Self::Io { .. } => ErrorKind::Transfer,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Shorthand for building an [`UpdateError::Io`]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
