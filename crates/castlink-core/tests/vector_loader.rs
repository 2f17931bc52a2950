//! Cast frame vectors: hex-encoded wire bytes plus the envelopes (or error
//! code) a decoder must produce from them. Files live in `tests/vectors/`.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use serde::Deserialize;

use castlink_core::protocol::{Envelope, Payload};

#[derive(Debug, Deserialize)]
pub struct FrameVector {
    pub description: String,
    pub frame: WireBytes,
    #[serde(default)]
    pub expect: Option<Decoded>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

impl FrameVector {
    pub fn load(name: &str) -> Self {
        let path = format!("tests/vectors/{name}");
        let s = fs::read_to_string(&path).unwrap_or_else(|e| panic!("{path}: {e}"));
        serde_json::from_str(&s).unwrap_or_else(|e| panic!("{path}: {e}"))
    }
}

/// Envelopes expected in wire order, and the bytes left buffered after them.
#[derive(Debug, Deserialize)]
pub struct Decoded {
    pub frames: Vec<ExpectedEnvelope>,
    pub remaining: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedEnvelope {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    #[serde(default)]
    pub payload_utf8: Option<String>,
    #[serde(default)]
    pub payload_binary_hex: Option<String>,
}

impl ExpectedEnvelope {
    pub fn assert_matches(&self, got: &Envelope, ctx: &str) {
        assert_eq!(got.source_id, self.source_id, "vector={ctx}");
        assert_eq!(got.destination_id, self.destination_id, "vector={ctx}");
        assert_eq!(got.namespace, self.namespace, "vector={ctx}");
        match &got.payload {
            Payload::Utf8(s) => assert_eq!(Some(s.as_str()), self.payload_utf8.as_deref(), "vector={ctx}"),
            Payload::Binary(b) => {
                assert_eq!(Some(hex::encode(b)), self.payload_binary_hex, "vector={ctx}")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

/// Cast frames are binary; vectors carry them as hex.
#[derive(Debug, Deserialize)]
pub struct WireBytes {
    pub encoding: String,
    pub data: String,
}

impl WireBytes {
    pub fn bytes(&self) -> Vec<u8> {
        assert_eq!(self.encoding, "hex", "frame vectors are hex-encoded");
        hex::decode(&self.data).expect("invalid hex in frame vector")
    }
}
