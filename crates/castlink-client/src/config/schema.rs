use serde::Deserialize;

use castlink_core::error::{CastError, Result};
use castlink_core::protocol::{namespace, DEFAULT_MAX_FRAME_BYTES};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub device: DeviceSection,

    #[serde(default)]
    pub link: LinkSection,

    #[serde(default)]
    pub sender: SenderSection,
}

impl ClientConfig {
    /// Defaults for one receiver, without a config file.
    pub fn for_device(host: impl Into<String>, port: u16) -> Self {
        Self {
            version: 1,
            device: DeviceSection {
                host: host.into(),
                port,
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            link: LinkSection::default(),
            sender: SenderSection::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CastError::UnsupportedVersion);
        }

        self.device.validate()?;
        self.link.validate()?;
        self.sender.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DeviceSection {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CastError::Config("device.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(CastError::Config("device.port must not be 0".into()));
        }
        if !(500..=60000).contains(&self.connect_timeout_ms) {
            return Err(CastError::Config(
                "device.connect_timeout_ms must be between 500 and 60000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSection {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_initial_request_id")]
    pub initial_request_id: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            initial_request_id: default_initial_request_id(),
            request_timeout_ms: default_request_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl LinkSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=60000).contains(&self.heartbeat_interval_ms) {
            return Err(CastError::Config(
                "link.heartbeat_interval_ms must be between 1000 and 60000".into(),
            ));
        }
        // 0 is what receivers put in unsolicited updates; never issue it.
        if self.initial_request_id == 0 {
            return Err(CastError::Config("link.initial_request_id must be >= 1".into()));
        }
        if !(100..=120000).contains(&self.request_timeout_ms) {
            return Err(CastError::Config(
                "link.request_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if !(64..=1024 * 1024).contains(&self.max_frame_bytes) {
            return Err(CastError::Config(
                "link.max_frame_bytes must be between 64 and 1048576".into(),
            ));
        }
        if !(1..=4096).contains(&self.subscriber_capacity) {
            return Err(CastError::Config(
                "link.subscriber_capacity must be between 1 and 4096".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SenderSection {
    #[serde(default = "default_sender_id")]
    pub id: String,

    /// Endpoint used for application (media) channels.
    #[serde(default)]
    pub media_id: Option<String>,
}

impl Default for SenderSection {
    fn default() -> Self {
        Self {
            id: default_sender_id(),
            media_id: None,
        }
    }
}

impl SenderSection {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CastError::Config("sender.id must not be empty".into()));
        }
        if self.media_id.as_deref() == Some("") {
            return Err(CastError::Config("sender.media_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn media_id(&self) -> String {
        self.media_id
            .clone()
            .unwrap_or_else(|| format!("client-{}", std::process::id()))
    }
}

fn default_port() -> u16 {
    namespace::DEFAULT_PORT
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_heartbeat_interval_ms() -> u64 {
    5000
}
fn default_initial_request_id() -> u64 {
    1
}
fn default_request_timeout_ms() -> u64 {
    10000
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_subscriber_capacity() -> usize {
    64
}
fn default_sender_id() -> String {
    namespace::SENDER_ID.into()
}
