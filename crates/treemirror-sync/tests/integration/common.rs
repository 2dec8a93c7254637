//! Shared test helpers for engine integration tests
//!
//! Provides an in-memory [`RemoteSource`] whose tree and file contents are
//! declared up front, plus helpers for preparing local directories.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use treemirror_core::domain::{NodeRecord, RemoteNode, RemoteTree, UpdateError};
use treemirror_core::manifest::ManifestOptions;
use treemirror_core::ports::{ProgressFn, RemoteSource};
use treemirror_sync::{UpdateEngine, UpdateTask};

/// Timestamp used for remote files unless a test says otherwise
pub const REMOTE_TS: &str = "2024-03-01T10:00:00Z";

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 timestamp")
}

/// In-memory remote source
pub struct FakeSource {
    tree: Arc<RemoteTree>,
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    options: ManifestOptions,
    pub connects: AtomicU32,
    pub invalidations: AtomicU32,
}

#[derive(Default)]
pub struct FakeSourceBuilder {
    records: Vec<NodeRecord>,
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    priority: Option<i32>,
}

impl FakeSource {
    pub fn builder() -> FakeSourceBuilder {
        FakeSourceBuilder::default()
    }
}

impl FakeSourceBuilder {
    /// Adds a manifest file at the root
    pub fn manifest(self, yaml: &str) -> Self {
        self.file_at("update-manifest.yaml", yaml.as_bytes(), Some(REMOTE_TS))
    }

    /// Adds a file stamped with [`REMOTE_TS`]
    pub fn file(self, path: &str, content: &[u8]) -> Self {
        self.file_at(path, content, Some(REMOTE_TS))
    }

    /// Adds a file with an explicit timestamp, or none
    pub fn file_at(mut self, path: &str, content: &[u8], modified: Option<&str>) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        let mut record = NodeRecord::file(path, name, content.len() as u64);
        if let Some(m) = modified {
            record = record.with_modified(ts(m));
        }
        self.records.push(record);
        self.contents.insert(path.to_string(), content.to_vec());
        self
    }

    /// Adds an empty directory
    pub fn dir(mut self, path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.records.push(NodeRecord::directory(path, name));
        self
    }

    /// Downloads of `path` fail
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Content served for `key` without adding a node
    pub fn content(mut self, key: &str, content: &[u8]) -> Self {
        self.contents.insert(key.to_string(), content.to_vec());
        self
    }

    pub fn build(mut self) -> Arc<FakeSource> {
        let tree = RemoteTree::from_paths(std::mem::take(&mut self.records));
        self.finish(tree)
    }

    /// Builds the tree from parent-linked `records`, as object-tree listings are
    pub fn build_linked(self, records: Vec<NodeRecord>) -> Arc<FakeSource> {
        let tree = RemoteTree::from_parent_links(records).expect("linked listing has a root");
        self.finish(tree)
    }

    fn finish(self, tree: RemoteTree) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            tree: Arc::new(tree),
            contents: self.contents,
            failing: self.failing,
            options: ManifestOptions::with_priority(self.priority.unwrap_or(1)),
            connects: AtomicU32::new(0),
            invalidations: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl RemoteSource for FakeSource {
    fn endpoint(&self) -> &str {
        "memory://fake"
    }

    fn manifest_options(&self) -> ManifestOptions {
        self.options
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tree(&self, cancel: &CancellationToken) -> Result<Arc<RemoteTree>, UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        Ok(Arc::clone(&self.tree))
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    async fn read_bytes(
        &self,
        node: &RemoteNode,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError> {
        self.contents
            .get(&node.key)
            .cloned()
            .ok_or_else(|| UpdateError::Transfer {
                path: node.key.clone().into(),
                source: anyhow::anyhow!("no content for {}", node.key),
            })
    }

    async fn download(
        &self,
        node: &RemoteNode,
        destination: &Path,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        if self.failing.contains(&node.key) {
            return Err(UpdateError::Transfer {
                path: destination.to_path_buf(),
                source: anyhow::anyhow!("simulated failure"),
            });
        }
        let content = self.read_bytes(node, cancel).await?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UpdateError::io(parent, e))?;
        }
        if destination.is_dir() {
            std::fs::remove_dir_all(destination).map_err(|e| UpdateError::io(destination, e))?;
        }
        std::fs::write(destination, &content).map_err(|e| UpdateError::io(destination, e))?;

        if let Some(report) = progress {
            report(content.len() as u64, node.size);
        }
        Ok(())
    }
}

/// Manifest with one rule per `(server_path, client_path, options)` entry
pub fn manifest(rules: &[(&str, &Path, &str)]) -> String {
    let mut yaml = String::from("rules:\n");
    for (server, client, extra) in rules {
        yaml.push_str(&format!(
            "  - server_path: '{server}'\n    client_path: '{}'\n",
            client.display()
        ));
        for line in extra.lines().filter(|l| !l.trim().is_empty()) {
            yaml.push_str(&format!("    {}\n", line.trim()));
        }
    }
    yaml
}

/// Writes `content` to `path`, creating parents
pub fn write_local(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().expect("path has a parent")).expect("create parents");
    std::fs::write(path, content).expect("write local file");
}

/// Sets the last write time of `path`
pub fn set_mtime(path: &Path, when: DateTime<Utc>) {
    let secs = when.timestamp() as u64;
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open for mtime")
        .set_modified(time)
        .expect("set mtime");
}

/// Runs the engine and unwraps every rule's task
pub async fn tasks_for(source: &Arc<FakeSource>) -> Vec<UpdateTask> {
    let engine = UpdateEngine::new(source.clone());
    engine
        .get_update_items(&CancellationToken::new())
        .await
        .expect("engine run")
        .into_iter()
        .map(|t| t.expect("rule task"))
        .collect()
}

/// Applies every task, asserting no item fails
pub async fn apply_all(tasks: &[UpdateTask]) {
    let cancel = CancellationToken::new();
    for task in tasks {
        let report = task.apply(&cancel).await.expect("apply");
        assert!(report.is_success(), "failures: {:?}", report.failures);
    }
}
