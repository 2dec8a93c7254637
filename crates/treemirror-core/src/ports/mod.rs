//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces the core depends on, whose implementations live in
//! adapter crates.
//!
//! - [`RemoteSource`] - One remote endpoint: connect, list, download

pub mod remote_source;

pub use remote_source::{Credentials, ProgressFn, RemoteSource};
