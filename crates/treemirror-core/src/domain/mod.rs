//! Domain entities and business logic
//!
//! This module contains the core domain types for treemirror:
//! - Remote node model and the arena-backed remote tree
//! - Update rules and versioning policies
//! - The error taxonomy shared by every crate in the workspace

pub mod errors;
pub mod node;
pub mod rule;

// Re-export commonly used types
pub use errors::{ErrorKind, UpdateError};
pub use node::{names_match, NodeId, NodeKind, NodeRecord, RemoteNode, RemoteTree};
pub use rule::{UpdateRule, VersioningPolicy};
