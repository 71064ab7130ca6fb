// ── Runtime station configuration ──
//
// Describes *how* to talk to a command station. Never touches disk:
// the CLI (via excs-config) constructs a `StationConfig` and hands it in.

use std::time::Duration;

use excs_api::{ConnectionConfig, DEFAULT_PORT, ReconnectConfig};

/// Configuration for one command station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// Hostname or IP address of the station.
    pub host: String,
    pub port: u16,
    pub connection_timeout: Duration,
    /// Wait for a correlated reply.
    pub response_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Quiet period that ends a multi-line reply (track list).
    pub settle_time: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl StationConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let connection = ConnectionConfig::new(host, port);
        Self {
            host: connection.host,
            port: connection.port,
            connection_timeout: connection.connection_timeout,
            response_timeout: connection.response_timeout,
            heartbeat_interval: connection.heartbeat_interval,
            heartbeat_timeout: connection.heartbeat_timeout,
            min_backoff: connection.reconnect.min_delay,
            max_backoff: connection.reconnect.max_delay,
            settle_time: Duration::from_millis(250),
        }
    }

    /// Wire-layer settings for [`excs_api::StationClient`].
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            connection_timeout: self.connection_timeout,
            response_timeout: self.response_timeout,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            reconnect: ReconnectConfig {
                min_delay: self.min_backoff,
                max_delay: self.max_backoff,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_station_protocol() {
        let config = StationConfig::new("layout.local", 2560);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.response_timeout, Duration::from_secs(20));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(150));
        assert_eq!(config.max_backoff, Duration::from_secs(60));

        let wire = config.connection_config();
        assert_eq!(wire.addr(), "layout.local:2560");
        assert_eq!(wire.reconnect.min_delay, config.min_backoff);
    }
}
