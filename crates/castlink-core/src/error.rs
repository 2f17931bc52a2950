//! Shared error type across castlink crates.

use thiserror::Error;

/// Stable error codes, used in logs and asserted by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// TCP connect or TLS handshake failed.
    Connect,
    /// Malformed length prefix or undecodable envelope.
    Frame,
    /// JSON payload lacks `type` or does not match its declared shape.
    ProtocolMismatch,
    /// Receiver closed the socket.
    RemoteClosed,
    /// Socket read/write failure.
    Socket,
    /// Operation on a link that is already closed.
    Closed,
    /// No correlated reply arrived in time.
    Timeout,
    /// Receiver answered a request with an error message.
    Rejected,
    /// Invalid configuration.
    Config,
    /// Unsupported config or envelope version.
    UnsupportedVersion,
    /// Serialization or other local failure.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Connect => "CONNECT",
            ErrorCode::Frame => "FRAME",
            ErrorCode::ProtocolMismatch => "PROTOCOL_MISMATCH",
            ErrorCode::RemoteClosed => "REMOTE_CLOSED",
            ErrorCode::Socket => "SOCKET",
            ErrorCode::Closed => "CLOSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Rejected => "REJECTED",
            ErrorCode::Config => "CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// Whether an error with this code terminates the link it occurred on.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorCode::Connect | ErrorCode::Frame | ErrorCode::RemoteClosed | ErrorCode::Socket
        )
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CastError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("bad frame: {0}")]
    Frame(String),
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("remote closed the connection")]
    RemoteClosed,
    #[error("socket error: {0}")]
    Socket(String),
    #[error("link closed")]
    Closed,
    #[error("no reply after {0}ms")]
    Timeout(u64),
    #[error("request rejected by receiver: {msg_type}")]
    Rejected {
        msg_type: String,
        reason: Option<String>,
    },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl CastError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CastError::Connect(_) => ErrorCode::Connect,
            CastError::Frame(_) => ErrorCode::Frame,
            CastError::ProtocolMismatch(_) => ErrorCode::ProtocolMismatch,
            CastError::RemoteClosed => ErrorCode::RemoteClosed,
            CastError::Socket(_) => ErrorCode::Socket,
            CastError::Closed => ErrorCode::Closed,
            CastError::Timeout(_) => ErrorCode::Timeout,
            CastError::Rejected { .. } => ErrorCode::Rejected,
            CastError::Config(_) => ErrorCode::Config,
            CastError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            CastError::Internal(_) => ErrorCode::Internal,
        }
    }
}
