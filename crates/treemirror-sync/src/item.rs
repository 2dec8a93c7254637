//! Update items and tasks
//!
//! An [`UpdateItem`] is one operation needed to bring a local path in line
//! with the remote tree. All items produced for one rule are grouped in an
//! [`UpdateTask`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use treemirror_core::domain::{RemoteNode, UpdateError, UpdateRule};
use treemirror_core::ports::{ProgressFn, RemoteSource};

use crate::filesystem::remove_path;

/// Downloads one remote file over its local target
#[derive(Clone)]
pub struct DownloadItem {
    pub node: RemoteNode,
    pub source: Arc<dyn RemoteSource>,
    pub target: PathBuf,
}

impl fmt::Debug for DownloadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadItem")
            .field("node", &self.node)
            .field("source", &self.source.endpoint())
            .field("target", &self.target)
            .finish()
    }
}

/// Removes one extraneous local file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItem {
    pub target: PathBuf,
    pub is_dir: bool,
    /// Last write time of the local entry, if known
    pub modified: Option<DateTime<Utc>>,
}

/// One operation on one local path
#[derive(Debug, Clone)]
pub enum UpdateItem {
    Download(DownloadItem),
    Delete(DeleteItem),
}

impl UpdateItem {
    /// Local path this item writes or removes
    pub fn target_path(&self) -> &Path {
        match self {
            Self::Download(d) => &d.target,
            Self::Delete(d) => &d.target,
        }
    }

    /// Bytes to transfer; `None` for deletions
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Download(d) => Some(d.node.size),
            Self::Delete(_) => None,
        }
    }

    /// Remote timestamp for downloads, local write time for deletions
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Download(d) => d.node.timestamp(),
            Self::Delete(d) => d.modified,
        }
    }

    pub fn is_download(&self) -> bool {
        matches!(self, Self::Download(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete(_))
    }

    /// Performs the operation.
    ///
    /// Downloads connect the source first (a no-op when already connected)
    /// and report `(bytes_done, bytes_total)` through `progress`. Deleting a
    /// target that no longer exists succeeds.
    pub async fn update(
        &self,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        match self {
            Self::Download(d) => {
                debug!(path = %d.target.display(), size = d.node.size, "Downloading");
                d.source.connect(cancel).await?;
                d.source
                    .download(&d.node, &d.target, progress, cancel)
                    .await
            }
            Self::Delete(d) => {
                debug!(path = %d.target.display(), is_dir = d.is_dir, "Deleting");
                remove_path(&d.target).await?;
                if let Some(report) = progress {
                    report(0, 0);
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for UpdateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download(d) => write!(f, "download {}", d.target.display()),
            Self::Delete(d) => write!(f, "delete {}", d.target.display()),
        }
    }
}

/// Outcome of [`UpdateTask::apply`]
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Items that completed
    pub applied: usize,
    /// Items that failed, with their errors
    pub failures: Vec<(PathBuf, UpdateError)>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything one rule needs done
#[derive(Debug, Clone)]
pub struct UpdateTask {
    /// Display name of the rule
    pub name: String,
    pub rule: UpdateRule,
    pub items: Vec<UpdateItem>,
    /// Latest timestamp among all remote files visited for the rule
    pub latest_modified: Option<DateTime<Utc>>,
    /// Priority of the source that published the rule
    pub priority: i32,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn download_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_download()).count()
    }

    pub fn delete_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_delete()).count()
    }

    /// Sum of the sizes of all downloads
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().filter_map(UpdateItem::size).sum()
    }

    /// Applies every item in order.
    ///
    /// A failing item is recorded and the rest continue; cancellation stops
    /// the task and is returned as an error.
    pub async fn apply(&self, cancel: &CancellationToken) -> Result<ApplyReport, UpdateError> {
        let mut report = ApplyReport::default();
        for item in &self.items {
            match item.update(None, cancel).await {
                Ok(()) => report.applied += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(task = %self.name, item = %item, error = %e, "Update item failed");
                    report.failures.push((item.target_path().to_path_buf(), e));
                }
            }
        }
        info!(
            task = %self.name,
            applied = report.applied,
            failed = report.failures.len(),
            "Task applied"
        );
        Ok(report)
    }
}
