//! treemirror Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `RemoteNode`, `RemoteTree`, `UpdateRule`, `UpdateError`
//! - **Port definitions** - The `RemoteSource` trait implemented by remote adapters
//! - **Versioning** - The pure "is this local file current?" comparator
//! - **Manifest** - Parsing of the per-source update manifest into rules
//! - **Retry** - Bounded fixed-delay retry for async operations
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod manifest;
pub mod ports;
pub mod retry;
pub mod versioning;
