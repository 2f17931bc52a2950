//! Transport layer (TLS socket + frame IO).
//!
//! `tls` establishes the encrypted stream; `io` runs the reader/writer tasks
//! that deframe inbound bytes into the link and frame outbound envelopes.

pub mod io;
pub mod tls;
