//! Handshake record sent to the relay endpoint.
//!
//! The first message on a freshly opened tunnel channel is always a single
//! text frame carrying this record as JSON, e.g. `{"host":"example.com",
//! "port":443}`. Everything after it is opaque binary payload.

use serde::{Deserialize, Serialize};

use crate::target::ProxyTarget;

/// Destination announcement, serialized as the first tunnel message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelHello {
    pub host: String,
    pub port: u16,
}

impl TunnelHello {
    /// Encode as the JSON text frame the relay expects.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a received handshake frame (relay side).
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<&ProxyTarget> for TunnelHello {
    fn from(target: &ProxyTarget) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_wire_format() {
        let hello = TunnelHello {
            host: "example.com".to_string(),
            port: 443,
        };
        assert_eq!(
            hello.to_json().unwrap(),
            r#"{"host":"example.com","port":443}"#
        );
    }

    #[test]
    fn test_hello_round_trip() {
        let hello = TunnelHello::from_json(r#"{"host":"example.com","port":9443}"#).unwrap();
        assert_eq!(hello.host, "example.com");
        assert_eq!(hello.port, 9443);
    }

    #[test]
    fn test_hello_from_target() {
        let target = ProxyTarget {
            host: "example.com".to_string(),
            port: 8080,
            is_connect: false,
        };
        let hello = TunnelHello::from(&target);
        assert_eq!(hello.host, "example.com");
        assert_eq!(hello.port, 8080);
    }
}
