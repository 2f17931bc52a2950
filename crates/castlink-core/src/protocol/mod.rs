//! Protocol modules (binary envelope + JSON message layer).
//!
//! The Cast V2 wire format is layered:
//! - Frame: 4-byte big-endian length prefix followed by the envelope bytes.
//! - Envelope: protobuf `CastMessage` carrying source/destination/namespace.
//! - Message: the UTF-8 JSON payload, discriminated by its `type` field.
//!
//! All parsers are panic-free: malformed input is reported as `CastError`
//! instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod frame;
pub mod message;
pub mod namespace;

pub use envelope::{Envelope, Payload};
pub use frame::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES, FRAME_HEADER_LEN};
pub use message::{Heartbeat, Inbound, Message};
