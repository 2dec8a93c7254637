//! Hierarchical listing backend
//!
//! Servers that publish a recursive listing of slash-separated paths and
//! serve each file at `<endpoint>/<path>`.

pub mod client;
pub mod source;

pub use client::{HttpListingClient, ListingClient};
pub use source::ListingSource;
