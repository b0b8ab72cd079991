//! Process-wide relay configuration, read once at startup.

use serde::{Deserialize, Serialize};

/// Everything the proxy core needs to know at startup. Immutable afterwards;
/// there is no runtime mutation or re-evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebSocket URL of the remote relay endpoint (`ws://` or `wss://`).
    pub tunnel_url: String,
    /// Conventional HTTP proxy `host:port` the host routes through when the
    /// local listener cannot start.
    pub fallback_proxy: String,
    /// Loopback port the local listener binds. Port 0 binds an ephemeral
    /// port, useful in tests.
    pub local_listen_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tunnel_url: "wss://relay.umbra.dev/tunnel".to_string(),
            fallback_proxy: "relay.umbra.dev:3128".to_string(),
            local_listen_port: 3129,
        }
    }
}

impl RelayConfig {
    pub fn with_tunnel_url(mut self, url: &str) -> Self {
        self.tunnel_url = url.to_string();
        self
    }

    pub fn with_fallback_proxy(mut self, addr: &str) -> Self {
        self.fallback_proxy = addr.to_string();
        self
    }

    pub fn with_local_listen_port(mut self, port: u16) -> Self {
        self.local_listen_port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.local_listen_port, 3129);
        assert!(config.tunnel_url.starts_with("wss://"));
    }

    #[test]
    fn test_with_overrides() {
        let config = RelayConfig::default()
            .with_tunnel_url("ws://127.0.0.1:9000/tunnel")
            .with_local_listen_port(0);
        assert_eq!(config.tunnel_url, "ws://127.0.0.1:9000/tunnel");
        assert_eq!(config.local_listen_port, 0);
    }
}
