//! treemirror Sync - reconciliation of remote trees into local directories
//!
//! Provides:
//! - Local directory enumeration and removal ([`filesystem`])
//! - The case-insensitive recursive tree diff ([`reconcile`])
//! - Update items and tasks with their execution ([`item`])
//! - The per-source orchestration from manifest to tasks ([`engine`])
//!
//! ## Flow
//!
//! 1. Drop the source's memoized tree, connect, and list it
//! 2. Find and parse the update manifest at the remote root
//! 3. For every rule, resolve its server path and diff it against the
//!    local client path, producing one [`UpdateTask`](item::UpdateTask)
//! 4. The caller applies the items it wants with progress and cancellation

pub mod engine;
pub mod filesystem;
pub mod item;
pub mod reconcile;

pub use engine::UpdateEngine;
pub use item::{ApplyReport, DeleteItem, DownloadItem, UpdateItem, UpdateTask};
pub use reconcile::{reconcile, Reconciliation};
