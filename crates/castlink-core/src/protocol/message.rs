//! JSON message layer.
//!
//! Every UTF-8 payload except heartbeats is a JSON object with a `type` tag and
//! an optional `requestId`. Status kinds the controller understands are parsed
//! into typed variants; every other kind is kept as an opaque `Unknown` so it
//! still reaches subscribers without failing the link.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{CastError, Result};
use crate::protocol::namespace;

/// Message `type` strings.
pub mod kind {
    pub const CONNECT: &str = "CONNECT";
    pub const CLOSE: &str = "CLOSE";
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
    pub const GET_STATUS: &str = "GET_STATUS";
    pub const RECEIVER_STATUS: &str = "RECEIVER_STATUS";
    pub const MEDIA_STATUS: &str = "MEDIA_STATUS";
    pub const SET_VOLUME: &str = "SET_VOLUME";
    pub const PLAY: &str = "PLAY";
    pub const PAUSE: &str = "PAUSE";
    pub const SEEK: &str = "SEEK";
    pub const STOP: &str = "STOP";

    /// Replies that reject the request they correlate with.
    pub const ERROR_REPLIES: [&str; 5] = [
        "INVALID_REQUEST",
        "INVALID_PLAYER_STATE",
        "LOAD_FAILED",
        "LOAD_CANCELLED",
        "LAUNCH_ERROR",
    ];
}

/// Keep-alive bodies. Never parsed as a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Ping,
    Pong,
}

impl Heartbeat {
    pub fn msg_type(self) -> &'static str {
        match self {
            Heartbeat::Ping => kind::PING,
            Heartbeat::Pong => kind::PONG,
        }
    }

    /// Wire body sent for this heartbeat.
    pub fn body(self) -> String {
        format!(r#"{{"type":"{}"}}"#, self.msg_type())
    }
}

/// Classified UTF-8 payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Heartbeat(Heartbeat),
    Message(Message),
}

impl Inbound {
    /// Classify a payload by namespace, then by its `type` tag.
    ///
    /// Heartbeats accept both the bare shorthand (`PING`) and the JSON form
    /// (`{"type":"PING"}`).
    pub fn classify(ns: &str, payload: &str) -> Result<Self> {
        if ns == namespace::HEARTBEAT {
            return parse_heartbeat(payload).map(Inbound::Heartbeat);
        }
        Message::parse(payload).map(Inbound::Message)
    }
}

fn parse_heartbeat(payload: &str) -> Result<Heartbeat> {
    let trimmed = payload.trim();
    let tag = if trimmed.starts_with('{') {
        let v: Value = serde_json::from_str(trimmed)
            .map_err(|e| CastError::ProtocolMismatch(format!("heartbeat json: {e}")))?;
        v.get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    } else {
        trimmed.to_owned()
    };

    match tag.as_str() {
        kind::PING => Ok(Heartbeat::Ping),
        kind::PONG => Ok(Heartbeat::Pong),
        other => Err(CastError::ProtocolMismatch(format!(
            "unexpected heartbeat body: {other}"
        ))),
    }
}

/// Decoded application message (tagged union over the kinds we track).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ReceiverStatus(ReceiverStatusMessage),
    MediaStatus(MediaStatusMessage),
    Unknown(UnknownMessage),
}

impl Message {
    /// Parse a JSON payload.
    ///
    /// A payload that is not a JSON object, lacks `type`, or declares a tracked
    /// kind but does not match its shape is a `ProtocolMismatch`.
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| CastError::ProtocolMismatch(format!("invalid json: {e}")))?;
        let msg_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CastError::ProtocolMismatch("missing `type`".into()))?
            .to_owned();

        match msg_type.as_str() {
            kind::RECEIVER_STATUS => serde_json::from_value(value)
                .map(Message::ReceiverStatus)
                .map_err(|e| CastError::ProtocolMismatch(format!("{msg_type}: {e}"))),
            kind::MEDIA_STATUS => serde_json::from_value(value)
                .map(Message::MediaStatus)
                .map_err(|e| CastError::ProtocolMismatch(format!("{msg_type}: {e}"))),
            _ => {
                let request_id = value.get("requestId").and_then(Value::as_u64);
                Ok(Message::Unknown(UnknownMessage {
                    msg_type,
                    request_id,
                    body: value,
                }))
            }
        }
    }

    pub fn msg_type(&self) -> &str {
        match self {
            Message::ReceiverStatus(_) => kind::RECEIVER_STATUS,
            Message::MediaStatus(_) => kind::MEDIA_STATUS,
            Message::Unknown(m) => &m.msg_type,
        }
    }

    /// Correlation id. Receivers send `0` for unsolicited updates, which is
    /// reported as absent.
    pub fn request_id(&self) -> Option<u64> {
        let id = match self {
            Message::ReceiverStatus(m) => m.request_id,
            Message::MediaStatus(m) => m.request_id,
            Message::Unknown(m) => m.request_id,
        };
        id.filter(|id| *id != 0)
    }

    pub fn as_receiver_status(&self) -> Option<&ReceiverStatusMessage> {
        match self {
            Message::ReceiverStatus(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_media_status(&self) -> Option<&MediaStatusMessage> {
        match self {
            Message::MediaStatus(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this reply rejects the request it correlates with.
    pub fn is_error_reply(&self) -> bool {
        kind::ERROR_REPLIES.contains(&self.msg_type())
    }

    /// `reason` field of an error reply, when present.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Message::Unknown(m) => m.body.get("reason").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Any kind without a typed variant. `body` is the full JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    pub msg_type: String,
    pub request_id: Option<u64>,
    pub body: Value,
}

/// Serialize an outgoing request: `{type, requestId?, ...data}`.
///
/// `data` must be a JSON object (its fields are merged) or `null`.
pub fn encode_request(msg_type: &str, request_id: Option<u64>, data: Value) -> Result<String> {
    let mut obj = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(CastError::Internal(format!(
                "request data must be an object, got {other}"
            )))
        }
    };
    obj.insert("type".into(), Value::String(msg_type.to_owned()));
    if let Some(id) = request_id {
        obj.insert("requestId".into(), Value::from(id));
    }
    serde_json::to_string(&Value::Object(obj))
        .map_err(|e| CastError::Internal(format!("json encode failed: {e}")))
}

// --------------------
// RECEIVER_STATUS
// --------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatusMessage {
    #[serde(default)]
    pub request_id: Option<u64>,
    pub status: ReceiverStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub volume: Option<Volume>,
}

impl ReceiverStatus {
    /// First application exposing `ns`, in the receiver's order.
    pub fn application_with(&self, ns: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.exposes(ns))
    }
}

/// A running receiver application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub display_name: String,
    pub session_id: String,
    #[serde(default)]
    pub status_text: String,
    pub transport_id: String,
    #[serde(default)]
    pub namespaces: Vec<NamespaceEntry>,
    #[serde(default)]
    pub is_idle_screen: bool,
}

impl Application {
    pub fn exposes(&self, ns: &str) -> bool {
        self.namespaces.iter().any(|n| n.name == ns)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamespaceEntry {
    pub name: String,
}

/// Volume block. Every field is optional in partial updates.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub step_interval: Option<f64>,
    #[serde(default)]
    pub control_type: Option<String>,
}

// --------------------
// MEDIA_STATUS
// --------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatusMessage {
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub status: Vec<MediaStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Idle,
    Buffering,
    Buffered,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerState::Idle => "IDLE",
            PlayerState::Buffering => "BUFFERING",
            PlayerState::Buffered => "BUFFERED",
            PlayerState::Playing => "PLAYING",
            PlayerState::Paused => "PAUSED",
        }
    }
}

/// One media session entry of a MEDIA_STATUS message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatus {
    /// Receivers send a number; some proxies send a string. Kept as text.
    #[serde(deserialize_with = "string_or_number")]
    pub media_session_id: String,
    pub player_state: PlayerState,
    #[serde(default)]
    pub current_time: Option<f64>,
    #[serde(default)]
    pub playback_rate: Option<f64>,
    #[serde(default)]
    pub supported_media_commands: Option<u64>,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub media: Option<MediaInformation>,
    #[serde(default)]
    pub idle_reason: Option<String>,
    #[serde(default)]
    pub current_item_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    #[serde(default)]
    pub content_id: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub metadata: Option<MediaMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub metadata_type: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub series_title: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

fn string_or_number<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
        Float(f64),
    }

    Ok(match Raw::deserialize(de)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

/// Render a media session id the way receivers expect it back: a number when
/// it is numeric, a string otherwise.
pub fn media_session_id_value(id: &str) -> Value {
    id.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.to_owned()))
}
