//! Well-known namespaces and endpoint ids.

/// Virtual connection setup/teardown (CONNECT / CLOSE).
pub const CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
/// Keep-alive PING / PONG.
pub const HEARTBEAT: &str = "urn:x-cast:com.google.cast.heartbeat";
/// Platform receiver: applications, device volume.
pub const RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
/// Media sessions of a running application.
pub const MEDIA: &str = "urn:x-cast:com.google.cast.media";

/// Root sender endpoint.
pub const SENDER_ID: &str = "sender-0";
/// Root receiver endpoint (the platform itself).
pub const RECEIVER_ID: &str = "receiver-0";
/// Broadcast destination used by receivers for unsolicited status.
pub const WILDCARD_ID: &str = "*";

/// Default TLS port of a Cast receiver.
pub const DEFAULT_PORT: u16 = 8009;
