//! Runtime configuration.
//!
//! Configuration is plain JSON. Every section is optional and falls back to
//! its default, so an empty object is a valid config.
//!
//! ```json
//! {
//!   "feed": { "capacity": 2048, "subscriber_buffer": 128 },
//!   "registry": { "watch_buffer": 32 },
//!   "channels": [
//!     { "id": "twilio/whatsapp", "display_name": "WhatsApp",
//!       "endpoint_path": "/twilio/whatsapp", "status": "active" }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::{default_channels, ChannelConnection};
use crate::error::{AajiError, AajiResult};
use crate::feed::{ChannelLookup, FeedConfig, LiveFeed};
use crate::registry::{ConnectionRegistry, RegistryConfig};

/// Maximum accepted config file size.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AajiConfig {
    /// Feed bounds.
    pub feed: FeedConfig,
    /// Registry bounds.
    pub registry: RegistryConfig,
    /// Channels registered at startup, in order.
    pub channels: Vec<ChannelConnection>,
}

impl AajiConfig {
    /// Config seeded with the product's four default channels.
    #[must_use]
    pub fn with_default_channels() -> Self {
        Self {
            channels: default_channels(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> AajiResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| AajiError::config(format!("invalid config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> AajiResult<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(|e| AajiError::config(format!("cannot stat {}: {e}", path.display())))?;
        if meta.len() > MAX_CONFIG_BYTES {
            return Err(AajiError::config(format!(
                "{} exceeds maximum config size of {MAX_CONFIG_BYTES} bytes",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path).map_err(|e| AajiError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Check bounds and every seeded channel record.
    ///
    /// Uniqueness of seeded channels is enforced by the registry in [`AajiConfig::build`].
    pub fn validate(&self) -> AajiResult<()> {
        self.feed.validate()?;
        self.registry.validate()?;
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }

    /// Build a registry seeded with `channels` and a feed validating against it.
    ///
    /// # Errors
    /// - `ValidationError` if the config is invalid
    /// - `DuplicateChannel` if two seeded channels share an id or endpoint path
    pub fn build(&self) -> AajiResult<(Arc<ConnectionRegistry>, LiveFeed)> {
        self.validate()?;

        let registry = Arc::new(ConnectionRegistry::new(self.registry.clone()));
        for channel in &self.channels {
            registry.register(channel.clone())?;
        }

        let lookup: Arc<dyn ChannelLookup> = Arc::clone(&registry) as Arc<dyn ChannelLookup>;
        let feed = LiveFeed::new(self.feed.clone(), lookup);
        info!(
            channels = self.channels.len(),
            capacity = self.feed.capacity,
            subscriber_buffer = self.feed.subscriber_buffer,
            "registry and feed ready"
        );
        Ok((registry, feed))
    }
}
