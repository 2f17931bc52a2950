//! Top-level facade crate for castlink.
//!
//! Re-exports the protocol core and the client library so users can depend on a single crate.

pub mod core {
    pub use castlink_core::*;
}

pub mod client {
    pub use castlink_client::*;
}
