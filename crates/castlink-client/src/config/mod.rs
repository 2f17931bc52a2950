//! `castlink.yaml` loading.
//!
//! Unknown keys are rejected at every level and ranges are checked before a
//! `ClientConfig` is handed out, so a typo in a device file fails at startup
//! instead of silently falling back to a default.

pub mod schema;

use std::fs;
use std::path::Path;

use castlink_core::error::{CastError, Result};

pub use schema::{ClientConfig, DeviceSection, LinkSection, SenderSection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| CastError::Config(format!("{}: {e}", path.display())))?;
    load_from_str(&s).map_err(|e| match e {
        CastError::Config(msg) => CastError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parse and validate a YAML document.
pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig =
        serde_yaml::from_str(s).map_err(|e| CastError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}
