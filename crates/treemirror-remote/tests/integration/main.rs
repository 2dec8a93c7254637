//! Integration tests for treemirror-remote
//!
//! Uses wiremock to simulate object-tree and listing servers and verifies
//! session handling, retries, listing, and downloads end to end.

mod common;

mod test_object_tree;
