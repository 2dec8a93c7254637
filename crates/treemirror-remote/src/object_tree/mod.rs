//! Object-tree backend
//!
//! Services that return the whole shared tree as one flat list of nodes,
//! each naming its parent by handle.

pub mod client;
pub mod source;

pub use client::{HttpObjectTreeClient, ObjectTreeClient};
pub use source::ObjectTreeSource;

/// Service host used when a source does not configure one
pub const DEFAULT_SERVICE_HOST: &str = "share.treemirror.net";
