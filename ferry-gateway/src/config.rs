//! Gateway configuration
//!
//! Environment-variable driven with development defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the WebSocket hub listens on.
    pub bind_addr: String,
    /// Expected agent heartbeat cadence; health cuts off at twice this.
    pub heartbeat_interval: Duration,
    /// How long a tunneled request waits for the agent's response.
    pub response_timeout: Duration,
    /// How long a fresh socket gets to send its Authenticate frame.
    pub auth_deadline: Duration,
    /// Outbound push channel depth per agent connection.
    pub outbound_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            response_timeout: Duration::from_secs(60),
            auth_deadline: Duration::from_secs(10),
            outbound_capacity: 64,
        }
    }
}

impl GatewayConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// - `FERRY_GATEWAY_BIND`: listen address (default `0.0.0.0:8080`)
    /// - `FERRY_HEARTBEAT_INTERVAL_SECS`: expected heartbeat cadence (default 30)
    /// - `FERRY_RESPONSE_TIMEOUT_SECS`: tunnel response deadline (default 60)
    /// - `FERRY_AUTH_DEADLINE_SECS`: authenticate frame deadline (default 10)
    /// - `FERRY_OUTBOUND_CAPACITY`: per-connection push buffer (default 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            bind_addr: std::env::var("FERRY_GATEWAY_BIND").unwrap_or(defaults.bind_addr),
            heartbeat_interval: secs("FERRY_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            response_timeout: secs("FERRY_RESPONSE_TIMEOUT_SECS", defaults.response_timeout),
            auth_deadline: secs("FERRY_AUTH_DEADLINE_SECS", defaults.auth_deadline),
            outbound_capacity: std::env::var("FERRY_OUTBOUND_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.outbound_capacity),
        }
    }
}
