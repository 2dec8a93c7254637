//! Remote node model
//!
//! A [`RemoteTree`] is a snapshot of one remote source: a flat arena of
//! [`RemoteNode`]s plus an index from parent to children. Object-tree
//! backends build it from explicit parent links, hierarchical backends from
//! full paths; reconciliation only ever sees the arena.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::errors::UpdateError;

/// Index of a node inside its [`RemoteTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// One entry in a remote tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    /// Position in the owning tree
    pub id: NodeId,
    /// Backend-native identifier (object handle or full path)
    pub key: String,
    /// Entry name, compared case-insensitively
    pub name: String,
    /// File or directory
    pub kind: NodeKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time reported by the remote
    pub modified: Option<DateTime<Utc>>,
    /// Creation time reported by the remote
    pub created: Option<DateTime<Utc>>,
    /// Parent directory (None for the tree root)
    pub parent: Option<NodeId>,
}

impl RemoteNode {
    /// Returns true if this node is a file
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Returns true if this node is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Modification time, falling back to creation time
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.modified.or(self.created)
    }
}

/// A listing entry as reported by a backend, before it is placed in a tree
///
/// For [`RemoteTree::from_parent_links`] the `key` is the object handle and
/// `parent_key` links to the parent's handle. For [`RemoteTree::from_paths`]
/// the `key` is the full slash-separated path and `parent_key` is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub key: String,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub parent_key: Option<String>,
}

impl NodeRecord {
    /// Creates a file record
    pub fn file(key: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: NodeKind::File,
            size,
            modified: None,
            created: None,
            parent_key: None,
        }
    }

    /// Creates a directory record
    pub fn directory(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: NodeKind::Directory,
            size: 0,
            modified: None,
            created: None,
            parent_key: None,
        }
    }

    /// Sets the parent handle
    #[must_use]
    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    /// Sets the modification time
    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Sets the creation time
    #[must_use]
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// Case-insensitive comparison of two entry names
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Arena-backed snapshot of a remote tree
#[derive(Debug, Clone)]
pub struct RemoteTree {
    nodes: Vec<RemoteNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
    root: NodeId,
}

impl RemoteTree {
    /// Builds a tree from a flat listing with explicit parent handles.
    ///
    /// The root is the first directory whose parent handle is absent or not
    /// part of the listing. Other records whose parent cannot be found are
    /// kept in the arena but are unreachable from the root.
    pub fn from_parent_links(records: Vec<NodeRecord>) -> Result<Self, UpdateError> {
        let by_key: HashMap<String, NodeId> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), NodeId(i)))
            .collect();

        let root = records
            .iter()
            .position(|r| {
                r.kind == NodeKind::Directory
                    && r.parent_key
                        .as_ref()
                        .map_or(true, |p| !by_key.contains_key(p))
            })
            .map(NodeId)
            .ok_or_else(|| {
                UpdateError::Listing(anyhow::anyhow!("listing contains no root directory"))
            })?;

        let mut nodes = Vec::with_capacity(records.len());
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for (i, record) in records.into_iter().enumerate() {
            let id = NodeId(i);
            let parent = if id == root {
                None
            } else {
                record
                    .parent_key
                    .as_ref()
                    .and_then(|p| by_key.get(p).copied())
            };
            if let Some(parent) = parent {
                children.entry(parent).or_default().push(id);
            }
            nodes.push(RemoteNode {
                id,
                key: record.key,
                name: record.name,
                kind: record.kind,
                size: record.size,
                modified: record.modified,
                created: record.created,
                parent,
            });
        }

        Ok(Self {
            nodes,
            children,
            root,
        })
    }

    /// Builds a tree from a recursive listing keyed by slash-separated paths.
    ///
    /// A synthetic root directory with an empty key is created. Intermediate
    /// directories missing from the listing are synthesized. Paths differing
    /// only in case name one node: directories merge their children, and the
    /// first file listed wins.
    pub fn from_paths(records: Vec<NodeRecord>) -> Self {
        let root = NodeId(0);
        let mut tree = Self {
            nodes: vec![RemoteNode {
                id: root,
                key: String::new(),
                name: String::new(),
                kind: NodeKind::Directory,
                size: 0,
                modified: None,
                created: None,
                parent: None,
            }],
            children: HashMap::new(),
            root,
        };
        // Keyed by case-folded path.
        let mut by_path: HashMap<String, NodeId> = HashMap::new();
        by_path.insert(String::new(), root);

        for record in records {
            let path = normalize_path(&record.key);
            if path.is_empty() {
                continue;
            }
            let parent = tree.ensure_directory(&mut by_path, parent_path(&path));

            if let Some(&existing) = by_path.get(&path.to_lowercase()) {
                let node = &mut tree.nodes[existing.0];
                if node.is_directory() && record.kind == NodeKind::Directory {
                    // A synthesized directory is now reported explicitly.
                    node.modified = record.modified.or(node.modified);
                    node.created = record.created.or(node.created);
                } else {
                    warn!(path = %path, kept = %node.key, "Ignoring case-variant duplicate in listing");
                }
                continue;
            }

            let id = tree.push(RemoteNode {
                id: NodeId(0),
                name: last_segment(&path).to_string(),
                key: path.clone(),
                kind: record.kind,
                size: record.size,
                modified: record.modified,
                created: record.created,
                parent: Some(parent),
            });
            by_path.insert(path.to_lowercase(), id);
        }

        tree
    }

    fn push(&mut self, mut node: RemoteNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        if let Some(parent) = node.parent {
            self.children.entry(parent).or_default().push(id);
        }
        self.nodes.push(node);
        id
    }

    fn ensure_directory(&mut self, by_path: &mut HashMap<String, NodeId>, path: &str) -> NodeId {
        if let Some(&id) = by_path.get(&path.to_lowercase()) {
            return id;
        }
        let parent = self.ensure_directory(by_path, parent_path(path));
        let id = self.push(RemoteNode {
            id: NodeId(0),
            key: path.to_string(),
            name: last_segment(path).to_string(),
            kind: NodeKind::Directory,
            size: 0,
            modified: None,
            created: None,
            parent: Some(parent),
        });
        by_path.insert(path.to_lowercase(), id);
        id
    }

    /// Id of the root directory
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the node with the given id
    ///
    /// Ids are only ever handed out by this tree, so indexing cannot fail for
    /// ids obtained from it.
    pub fn node(&self, id: NodeId) -> &RemoteNode {
        &self.nodes[id.0]
    }

    /// Immediate children of a directory, in listing order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Finds an immediate child by case-insensitive name
    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<&RemoteNode> {
        self.children(id)
            .iter()
            .map(|&c| self.node(c))
            .find(|n| names_match(&n.name, name))
    }

    /// Resolves a slash-separated directory path from the root.
    ///
    /// Each segment is matched case-insensitively against child directories.
    /// An empty path resolves to the root.
    pub fn resolve(&self, server_path: &str) -> Result<NodeId, UpdateError> {
        let mut current = self.root;
        for segment in server_path.split(['/', '\\']).filter(|s| !s.is_empty()) {
            current = self
                .children(current)
                .iter()
                .map(|&c| self.node(c))
                .find(|n| n.is_directory() && names_match(&n.name, segment))
                .map(|n| n.id)
                .ok_or_else(|| UpdateError::ServerPathNotFound(server_path.to_string()))?;
        }
        Ok(current)
    }

    /// Total number of nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree holds no nodes besides its root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

fn normalize_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn last_segment(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}
