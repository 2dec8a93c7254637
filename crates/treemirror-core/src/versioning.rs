//! Versioning comparator
//!
//! Decides whether a local file is current relative to a remote node under a
//! [`VersioningPolicy`]. Pure: the caller supplies the local file's state.

use chrono::{DateTime, Utc};

use crate::domain::{RemoteNode, VersioningPolicy};

/// Snapshot of a local file's state, as far as versioning cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileState {
    /// Whether anything exists at the path
    pub exists: bool,
    /// Whether it is a regular file
    pub is_file: bool,
    /// Length in bytes (0 when missing or not a file)
    pub len: u64,
    /// Last write time
    pub modified: Option<DateTime<Utc>>,
}

impl LocalFileState {
    /// State of a path where nothing exists
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            len: 0,
            modified: None,
        }
    }

    /// State of an existing regular file
    pub fn file(len: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            exists: true,
            is_file: true,
            len,
            modified,
        }
    }

    /// Builds the state from filesystem metadata
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Self {
            exists: true,
            is_file: metadata.is_file(),
            len: if metadata.is_file() { metadata.len() } else { 0 },
            modified,
        }
    }

    /// Returns true if this is an existing regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.is_file
    }
}

/// Returns true if `local` needs no update to match `remote`.
///
/// A missing local file, or a directory where a file is expected, is never
/// current. Under [`VersioningPolicy::Date`] a remote node without any
/// timestamp is treated as current, while a local file without a readable
/// write time is not.
pub fn is_current(policy: VersioningPolicy, remote: &RemoteNode, local: &LocalFileState) -> bool {
    if !local.is_regular_file() {
        return false;
    }
    match policy {
        VersioningPolicy::Size => remote.size == local.len,
        VersioningPolicy::Date => match (remote.timestamp(), local.modified) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(remote_ts), Some(local_ts)) => remote_ts <= local_ts,
        },
    }
}
