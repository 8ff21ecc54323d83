//! Client configuration.

use std::time::Duration;

use crate::protocol::SAFE_CAPACITY;

/// Default timeout for simple commands (transport, mixer, pattern ops).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for discovery-class commands. Scanning a plugin's
/// full parameter table can take several seconds on the remote side.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(12);

/// Default writer channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Identifiers for the two logical channels of the control bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Channel carrying commands toward the device.
    pub outbound: String,
    /// Channel carrying responses back from the device.
    pub inbound: String,
}

impl Endpoints {
    /// Create an endpoint pair.
    pub fn new(outbound: impl Into<String>, inbound: impl Into<String>) -> Self {
        Self {
            outbound: outbound.into(),
            inbound: inbound.into(),
        }
    }
}

/// Configuration for a [`BridgeClient`](crate::BridgeClient).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Deadline for simple commands.
    pub command_timeout: Duration,
    /// Deadline for discovery-class commands.
    pub discovery_timeout: Duration,
    /// Maximum encoded payload bytes per frame.
    pub safe_capacity: usize,
    /// Writer queue capacity (whole commands, not frames).
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            safe_capacity: SAFE_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.discovery_timeout, Duration::from_secs(12));
        assert_eq!(config.safe_capacity, SAFE_CAPACITY);
    }

    #[test]
    fn test_endpoints() {
        let endpoints = Endpoints::new("loopmidi-out", "loopmidi-in");
        assert_eq!(endpoints.outbound, "loopmidi-out");
        assert_eq!(endpoints.inbound, "loopmidi-in");
    }
}
