//! Envelope schema (`CastMessage`, proto2).
//!
//! The schema is small and fixed, so it is declared with `prost` derives
//! instead of a build-time `.proto` compilation step.

use bytes::Bytes;
use prost::Message as _;

use crate::error::{CastError, Result};

/// Only protocol version on the wire (`CASTV2_1_0`).
pub const PROTOCOL_VERSION: i32 = 0;

/// Raw protobuf message as it appears on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CastMessage {
    #[prost(enumeration = "ProtocolVersion", required, tag = "1")]
    pub protocol_version: i32,
    #[prost(string, required, tag = "2")]
    pub source_id: String,
    #[prost(string, required, tag = "3")]
    pub destination_id: String,
    #[prost(string, required, tag = "4")]
    pub namespace: String,
    #[prost(enumeration = "PayloadType", required, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload_binary: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtocolVersion {
    Castv210 = 0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    String = 0,
    Binary = 1,
}

/// Envelope payload. Only `Utf8` carries JSON; `Binary` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Utf8(String),
    Binary(Bytes),
}

impl Payload {
    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            Payload::Utf8(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Utf8(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded envelope: one addressed message on one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    pub payload: Payload,
}

impl Envelope {
    /// Build a UTF-8 (JSON or heartbeat) envelope.
    pub fn utf8(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: Payload::Utf8(payload.into()),
        }
    }

    /// Serialize to protobuf bytes (no length prefix).
    pub fn encode(&self) -> Vec<u8> {
        let (payload_type, payload_utf8, payload_binary) = match &self.payload {
            Payload::Utf8(s) => (PayloadType::String, Some(s.clone()), None),
            Payload::Binary(b) => (PayloadType::Binary, None, Some(b.to_vec())),
        };
        let raw = CastMessage {
            protocol_version: ProtocolVersion::Castv210 as i32,
            source_id: self.source_id.clone(),
            destination_id: self.destination_id.clone(),
            namespace: self.namespace.clone(),
            payload_type: payload_type as i32,
            payload_utf8,
            payload_binary,
        };
        raw.encode_to_vec()
    }

    /// Parse protobuf bytes (no length prefix) and check the envelope invariants.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let raw = CastMessage::decode(buf)
            .map_err(|e| CastError::Frame(format!("undecodable envelope: {e}")))?;

        if raw.protocol_version != PROTOCOL_VERSION {
            return Err(CastError::Frame(format!(
                "unknown protocol version {}",
                raw.protocol_version
            )));
        }
        if raw.source_id.is_empty() || raw.destination_id.is_empty() || raw.namespace.is_empty() {
            return Err(CastError::Frame("empty endpoint or namespace".into()));
        }

        let payload = match PayloadType::try_from(raw.payload_type) {
            Ok(PayloadType::String) => Payload::Utf8(
                raw.payload_utf8
                    .ok_or_else(|| CastError::Frame("STRING payload without payload_utf8".into()))?,
            ),
            Ok(PayloadType::Binary) => Payload::Binary(Bytes::from(
                raw.payload_binary
                    .ok_or_else(|| CastError::Frame("BINARY payload without payload_binary".into()))?,
            )),
            Err(_) => {
                return Err(CastError::Frame(format!(
                    "unknown payload type {}",
                    raw.payload_type
                )))
            }
        };

        Ok(Self {
            source_id: raw.source_id,
            destination_id: raw.destination_id,
            namespace: raw.namespace,
            payload,
        })
    }
}
