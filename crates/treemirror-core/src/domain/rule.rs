//! Update rules
//!
//! An [`UpdateRule`] maps one remote directory onto one local directory and
//! carries the flags that govern how the two are reconciled.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::UpdateError;

/// How to decide whether a local file is current relative to its remote node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningPolicy {
    /// Current iff the remote size equals the local length
    Size,
    /// Current iff the remote timestamp is not newer than the local write time
    Date,
}

impl Display for VersioningPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size => f.write_str("size"),
            Self::Date => f.write_str("date"),
        }
    }
}

impl FromStr for VersioningPolicy {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size" => Ok(Self::Size),
            "date" => Ok(Self::Date),
            other => Err(UpdateError::Configuration(format!(
                "unknown versioning mode '{other}'; valid options: size, date"
            ))),
        }
    }
}

/// One manifest-declared mapping from a remote path to a local path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRule {
    /// Optional display name
    pub name: Option<String>,
    /// Slash-separated path below the remote root, matched case-insensitively
    pub server_path: String,
    /// Absolute local directory that mirrors `server_path`
    pub client_path: PathBuf,
    /// Whether subdirectories are reconciled too
    pub recursive: bool,
    /// Whether local entries without a remote counterpart are deleted
    pub remove_extraneous: bool,
    /// Policy deciding whether a local file is current
    pub versioning: VersioningPolicy,
}

impl UpdateRule {
    /// Creates a rule with `recursive = true`, `remove_extraneous = false`
    /// and size-based versioning
    pub fn new(server_path: impl Into<String>, client_path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            server_path: server_path.into(),
            client_path: client_path.into(),
            recursive: true,
            remove_extraneous: false,
            versioning: VersioningPolicy::Size,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn remove_extraneous(mut self, remove: bool) -> Self {
        self.remove_extraneous = remove;
        self
    }

    #[must_use]
    pub fn versioning(mut self, policy: VersioningPolicy) -> Self {
        self.versioning = policy;
        self
    }

    /// Name shown to users: the explicit name, or the server path
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.server_path)
    }
}
