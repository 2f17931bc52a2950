//! castlink client library.
//!
//! Wires the TLS transport, the multiplexed link, and the status controller
//! into one stack. Consumed by the `castctl` binary and by integration tests.

pub mod config;
pub mod controller;
pub mod link;
pub mod transport;

pub use controller::Controller;
pub use link::{Channel, CloseReason, Link};
