//! castlink core: transport-agnostic Cast V2 protocol primitives.
//!
//! This crate defines the wire-level contracts (envelope schema, length-prefixed
//! framing, well-known namespaces) and the error surface shared by the client
//! runtime and its tests. It carries no TLS or async runtime dependencies so it
//! can be reused wherever bytes come from.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! A receiver sending garbage must surface as `CastError`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{CastError, ErrorCode, Result};
