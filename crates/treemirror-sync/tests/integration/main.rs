//! Integration tests for treemirror-sync
//!
//! Runs the update engine against an in-memory remote source and real
//! temporary directories, then applies the resulting tasks.

mod common;

mod test_edges;
