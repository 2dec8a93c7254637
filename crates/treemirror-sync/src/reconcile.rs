//! Recursive diff of a remote directory against a local directory
//!
//! Walks the remote tree from a resolved root, matching each remote child
//! to a local entry by case-insensitive name:
//!
//! - Remote file: download unless the matching local file is current under
//!   the rule's versioning policy. A local directory in its place is never
//!   current; the download replaces it.
//! - Remote directory: recurse into the matching local directory, or into
//!   the path where it should be. Skipped when the rule is not recursive.
//!   Sibling directories whose names differ only in case are walked as one.
//! - A remote entry whose name differs only in case from an earlier sibling
//!   of another kind, or from an earlier file, is skipped, so each local path
//!   is claimed once.
//! - Local entries nothing matched are deleted when the rule removes
//!   extraneous files. Local directories standing in for remote directories
//!   skipped by a non-recursive rule are kept.
//!
//! Local entries are read from disk; the remote side comes from the
//! snapshot only.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use treemirror_core::domain::{names_match, NodeId, NodeKind, RemoteTree, UpdateError, UpdateRule};
use treemirror_core::ports::RemoteSource;
use treemirror_core::versioning::{is_current, LocalFileState};

use crate::filesystem::{list_directory, LocalEntry};
use crate::item::{DeleteItem, DownloadItem, UpdateItem};

/// Result of diffing one rule
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Operations in the order they were found
    pub items: Vec<UpdateItem>,
    /// Latest timestamp among all remote files visited
    pub latest_modified: Option<DateTime<Utc>>,
}

impl Reconciliation {
    fn fold_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        if let Some(ts) = timestamp {
            self.latest_modified = Some(self.latest_modified.map_or(ts, |latest| latest.max(ts)));
        }
    }
}

struct Walk<'a> {
    tree: &'a RemoteTree,
    rule: &'a UpdateRule,
    source: &'a Arc<dyn RemoteSource>,
    cancel: &'a CancellationToken,
}

/// Diffs the remote directory `root` against `rule.client_path`.
///
/// Cancellation aborts the whole rule with [`UpdateError::Cancelled`]; no
/// partial list is returned.
pub async fn reconcile(
    tree: &RemoteTree,
    root: NodeId,
    rule: &UpdateRule,
    source: &Arc<dyn RemoteSource>,
    cancel: &CancellationToken,
) -> Result<Reconciliation, UpdateError> {
    let walk = Walk {
        tree,
        rule,
        source,
        cancel,
    };
    let mut acc = Reconciliation::default();
    reconcile_directory(&walk, vec![root], rule.client_path.clone(), &mut acc).await?;
    debug!(
        rule = rule.display_name(),
        items = acc.items.len(),
        "Reconciled rule"
    );
    Ok(acc)
}

/// Diffs the union of `remote_dirs` against `local_dir`
fn reconcile_directory<'a>(
    walk: &'a Walk<'a>,
    remote_dirs: Vec<NodeId>,
    local_dir: PathBuf,
    acc: &'a mut Reconciliation,
) -> BoxFuture<'a, Result<(), UpdateError>> {
    Box::pin(async move {
        let mut pending = list_directory(&local_dir).await?;
        let mut skipped_dirs: Vec<&str> = Vec::new();
        let mut claimed: Vec<(&str, NodeKind)> = Vec::new();

        let children: Vec<NodeId> = remote_dirs
            .iter()
            .flat_map(|&dir| walk.tree.children(dir).iter().copied())
            .collect();

        for &child_id in &children {
            if walk.cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            let child = walk.tree.node(child_id);
            if !is_safe_name(&child.name) {
                warn!(name = %child.name, "Skipping remote entry with unusable name");
                continue;
            }
            if let Some(&(first, kind)) = claimed
                .iter()
                .find(|(name, _)| names_match(name, &child.name))
            {
                // Same-named directories were merged when the first was visited.
                if !(kind == NodeKind::Directory && child.is_directory()) {
                    warn!(
                        name = %child.name,
                        kept = %first,
                        "Skipping remote entry that differs only in case from a sibling"
                    );
                }
                continue;
            }
            claimed.push((&child.name, child.kind));

            match child.kind {
                NodeKind::File => {
                    let (target, state) = match take_match(&mut pending, &child.name, |_| true) {
                        Some(entry) => (entry.path, entry.state),
                        None => (local_dir.join(&child.name), LocalFileState::not_found()),
                    };
                    if !is_current(walk.rule.versioning, child, &state) {
                        acc.items.push(UpdateItem::Download(DownloadItem {
                            node: child.clone(),
                            source: Arc::clone(walk.source),
                            target,
                        }));
                    }
                    acc.fold_timestamp(child.timestamp());
                }
                NodeKind::Directory => {
                    if !walk.rule.recursive {
                        skipped_dirs.push(&child.name);
                        continue;
                    }
                    let target = match take_match(&mut pending, &child.name, |e| e.is_dir) {
                        Some(entry) => entry.path,
                        None => {
                            // A local file in the way goes first so the directory can be created.
                            if walk.rule.remove_extraneous {
                                if let Some(file) = take_match(&mut pending, &child.name, |_| true) {
                                    acc.items.push(delete_item(file));
                                }
                            }
                            local_dir.join(&child.name)
                        }
                    };
                    let variants: Vec<NodeId> = children
                        .iter()
                        .copied()
                        .filter(|&id| {
                            let node = walk.tree.node(id);
                            node.is_directory() && names_match(&node.name, &child.name)
                        })
                        .collect();
                    reconcile_directory(walk, variants, target, acc).await?;
                }
            }
        }

        if walk.rule.remove_extraneous {
            for entry in pending {
                if entry.is_dir && skipped_dirs.iter().any(|name| names_match(name, &entry.name)) {
                    continue;
                }
                acc.items.push(delete_item(entry));
            }
        }
        Ok(())
    })
}

/// Removes and returns the local entry matching `name`, preferring an exact
/// match over a case-insensitive one.
fn take_match(
    pending: &mut Vec<LocalEntry>,
    name: &str,
    accept: impl Fn(&LocalEntry) -> bool,
) -> Option<LocalEntry> {
    let index = pending
        .iter()
        .position(|e| e.name == name && accept(e))
        .or_else(|| {
            pending
                .iter()
                .position(|e| names_match(&e.name, name) && accept(e))
        })?;
    Some(pending.remove(index))
}

fn delete_item(entry: LocalEntry) -> UpdateItem {
    UpdateItem::Delete(DeleteItem {
        target: entry.path,
        is_dir: entry.is_dir,
        modified: entry.state.modified,
    })
}

/// Rejects names that would escape the local directory
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
