//! Shard configuration
//!
//! Construction-time options for a shard. Loaded either explicitly through
//! the builder methods or from environment variables.

use crate::error::{ShardError, ShardResult};
use pulse_protocol::Intents;

/// Default gateway API version
pub const DEFAULT_API_VERSION: u8 = 8;

/// Configuration for a single shard
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Authentication token
    pub token: String,

    /// Intents bitmask; None identifies with a bitmask of 0
    pub intents: Option<Intents>,

    /// Shard identity
    pub shard_id: u32,

    /// Total shard count, when running sharded
    pub shard_count: Option<u32>,

    /// Opaque cache flags, forwarded to the surrounding application only
    pub cache_flags: Option<u128>,

    /// Forward every raw envelope to a raw-event notification before normal
    /// processing
    pub debug_events: bool,

    /// Gateway API version
    pub api_version: u8,

    /// Override of the well-known gateway URL, mainly for tests and proxies
    pub gateway_url: Option<String>,
}

impl ShardConfig {
    /// Create a configuration for a single unsharded connection
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: None,
            shard_id: 0,
            shard_count: None,
            cache_flags: None,
            debug_events: false,
            api_version: DEFAULT_API_VERSION,
            gateway_url: None,
        }
    }

    /// Set the intents bitmask
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = Some(intents);
        self
    }

    /// Set the shard identity within a sharded deployment
    #[must_use]
    pub fn with_shard(mut self, shard_id: u32, shard_count: u32) -> Self {
        self.shard_id = shard_id;
        self.shard_count = Some(shard_count);
        self
    }

    /// Set opaque cache flags
    #[must_use]
    pub fn with_cache_flags(mut self, flags: u128) -> Self {
        self.cache_flags = Some(flags);
        self
    }

    /// Enable raw-event debug notifications
    #[must_use]
    pub fn with_debug_events(mut self, enabled: bool) -> Self {
        self.debug_events = enabled;
        self
    }

    /// Override the gateway API version
    #[must_use]
    pub fn with_api_version(mut self, version: u8) -> Self {
        self.api_version = version;
        self
    }

    /// Override the well-known gateway URL
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads `GATEWAY_TOKEN` (required), `GATEWAY_INTENTS`, `SHARD_ID`,
    /// `SHARD_COUNT`, `GATEWAY_API_VERSION` and `GATEWAY_DEBUG_EVENTS`.
    /// A `.env` file is honored when present.
    pub fn from_env() -> ShardResult<Self> {
        dotenvy::dotenv().ok();

        let token = std::env::var("GATEWAY_TOKEN")
            .map_err(|_| ShardError::Config("GATEWAY_TOKEN is not set".to_string()))?;

        let mut config = Self::new(token);

        if let Ok(raw) = std::env::var("GATEWAY_INTENTS") {
            let bits = raw
                .parse::<u64>()
                .map_err(|e| ShardError::Config(format!("GATEWAY_INTENTS: {e}")))?;
            config.intents = Some(Intents::from_bits_truncate(bits));
        }

        if let Ok(raw) = std::env::var("SHARD_ID") {
            config.shard_id = raw
                .parse()
                .map_err(|e| ShardError::Config(format!("SHARD_ID: {e}")))?;
        }

        if let Ok(raw) = std::env::var("SHARD_COUNT") {
            config.shard_count = Some(
                raw.parse()
                    .map_err(|e| ShardError::Config(format!("SHARD_COUNT: {e}")))?,
            );
        }

        if let Ok(raw) = std::env::var("GATEWAY_API_VERSION") {
            config.api_version = raw
                .parse()
                .map_err(|e| ShardError::Config(format!("GATEWAY_API_VERSION: {e}")))?;
        }

        if let Ok(raw) = std::env::var("GATEWAY_URL") {
            config.gateway_url = Some(raw);
        }

        if let Ok(raw) = std::env::var("GATEWAY_DEBUG_EVENTS") {
            config.debug_events = matches!(raw.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// The intents value sent in the Identify payload
    #[must_use]
    pub fn intents_bits(&self) -> u64 {
        self.intents.map_or(0, |intents| intents.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ShardConfig::new("tok");
        assert_eq!(config.token, "tok");
        assert_eq!(config.shard_id, 0);
        assert_eq!(config.shard_count, None);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert!(!config.debug_events);
        assert_eq!(config.intents_bits(), 0);
    }

    #[test]
    fn test_config_builder() {
        let config = ShardConfig::new("tok")
            .with_intents(Intents::GUILDS | Intents::GUILD_MESSAGES)
            .with_shard(2, 8)
            .with_debug_events(true)
            .with_api_version(9);

        assert_eq!(config.intents_bits(), (1 << 0) | (1 << 9));
        assert_eq!(config.shard_id, 2);
        assert_eq!(config.shard_count, Some(8));
        assert!(config.debug_events);
        assert_eq!(config.api_version, 9);
    }
}
