//! Update engine
//!
//! The [`UpdateEngine`] turns one remote source into a list of
//! [`UpdateTask`]s, one per rule of the source's manifest.
//!
//! ## Flow
//!
//! 1. **Refresh**: drop the memoized tree, connect, list the tree
//! 2. **Manifest**: find [`MANIFEST_FILE_NAME`] at the root (any case), read
//!    and parse it with the source's manifest options
//! 3. **Rules**: resolve each rule's server path and reconcile it against
//!    its client path
//!
//! Failures before step 3 fail the whole call, as does a manifest that is not
//! valid YAML. In step 3 each rule gets its own `Result`, so one invalid
//! record or unresolvable server path does not hide the others.
//! Cancellation always fails the whole call.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use treemirror_core::domain::{names_match, RemoteTree, UpdateError, UpdateRule};
use treemirror_core::manifest::{parse_manifest, MANIFEST_FILE_NAME};
use treemirror_core::ports::RemoteSource;

use crate::item::UpdateTask;
use crate::reconcile::reconcile;

/// Computes update tasks for one remote source
#[derive(Clone)]
pub struct UpdateEngine {
    source: Arc<dyn RemoteSource>,
}

impl UpdateEngine {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn RemoteSource> {
        &self.source
    }

    /// Computes one task per manifest rule, in manifest order.
    ///
    /// The outer `Result` fails on connection, listing, manifest, and
    /// cancellation errors. Each inner `Result` carries the outcome of one
    /// rule.
    #[instrument(skip_all, fields(endpoint = %self.source.endpoint()))]
    pub async fn get_update_items(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<UpdateTask, UpdateError>>, UpdateError> {
        self.source.invalidate().await;
        self.source.connect(cancel).await?;
        let tree = self.source.list_tree(cancel).await?;

        let manifest_node = tree
            .children(tree.root())
            .iter()
            .map(|&id| tree.node(id))
            .find(|n| n.is_file() && names_match(&n.name, MANIFEST_FILE_NAME))
            .ok_or_else(|| {
                UpdateError::ManifestMissing(format!(
                    "{MANIFEST_FILE_NAME} at {}",
                    self.source.endpoint()
                ))
            })?;

        let bytes = self.source.read_bytes(manifest_node, cancel).await?;
        let manifest = parse_manifest(&bytes, &self.source.manifest_options())?;
        info!(rules = manifest.rules.len(), priority = manifest.priority, "Parsed update manifest");

        let mut tasks = Vec::with_capacity(manifest.rules.len());
        for (index, rule) in manifest.rules.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            let rule = match rule {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(rule = index, error = %e, "Invalid manifest rule");
                    tasks.push(Err(e));
                    continue;
                }
            };
            let name = rule.display_name().to_string();
            match self.build_task(&tree, rule, manifest.priority, cancel).await {
                Ok(task) => {
                    info!(
                        rule = %name,
                        downloads = task.download_count(),
                        deletes = task.delete_count(),
                        bytes = task.total_bytes(),
                        "Rule reconciled"
                    );
                    tasks.push(Ok(task));
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(rule = %name, error = %e, "Rule failed");
                    tasks.push(Err(e));
                }
            }
        }
        Ok(tasks)
    }

    async fn build_task(
        &self,
        tree: &RemoteTree,
        rule: UpdateRule,
        priority: i32,
        cancel: &CancellationToken,
    ) -> Result<UpdateTask, UpdateError> {
        let root = tree.resolve(&rule.server_path)?;
        let reconciliation = reconcile(tree, root, &rule, &self.source, cancel).await?;

        Ok(UpdateTask {
            name: rule.display_name().to_string(),
            rule,
            items: reconciliation.items,
            latest_modified: reconciliation.latest_modified,
            priority,
        })
    }
}
