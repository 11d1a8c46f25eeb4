use crate::error::{BidError, BidResult};
use serde::Deserialize;

/// Root configuration. Loaded from environment variables with the prefix
/// `BID_EXPRESS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub orbitsoft: OrbitsoftConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuctionConfig {
    /// How long an auction round waits for adapters before closing with
    /// whatever outcomes have landed.
    #[serde(default = "default_auction_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Per-call timeout for bidder HTTP requests.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrbitsoftConfig {
    /// Ad-server endpoint the legacy adapter builds its bid URLs against.
    #[serde(default = "default_orbitsoft_endpoint")]
    pub endpoint: String,
    /// Fallback for the `loc` parameter when the batch carries no page URL.
    #[serde(default)]
    pub default_location: String,
}

fn default_auction_timeout_ms() -> u64 {
    3000
}
fn default_request_timeout_ms() -> u64 {
    1000
}
fn default_orbitsoft_endpoint() -> String {
    "http://orbitsoft.com/ads/show/hb".to_string()
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_auction_timeout_ms(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for OrbitsoftConfig {
    fn default() -> Self {
        Self {
            endpoint: default_orbitsoft_endpoint(),
            default_location: String::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auction: AuctionConfig::default(),
            transport: TransportConfig::default(),
            orbitsoft: OrbitsoftConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> BidResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BID_EXPRESS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(|e| BidError::Config(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| BidError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.auction.timeout_ms, 3000);
        assert_eq!(config.transport.request_timeout_ms, 1000);
        assert!(config.orbitsoft.endpoint.contains("orbitsoft.com"));
        assert!(config.orbitsoft.default_location.is_empty());
    }

    #[test]
    fn test_load_without_environment_uses_defaults() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.auction.timeout_ms, AuctionConfig::default().timeout_ms);
    }
}
