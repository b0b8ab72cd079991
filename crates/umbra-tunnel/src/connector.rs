//! Tunnel connector: validates the relay URL once, opens channels on demand.

use tracing::debug;
use umbra_proto::{ProxyTarget, TunnelHello};
use url::Url;

use crate::channel::TunnelChannel;
use crate::TunnelError;

/// Opens one [`TunnelChannel`] per proxied connection against a fixed relay
/// URL. Constructing the connector is the startup-time capability check: an
/// unusable URL is surfaced here, before any listener is bound.
#[derive(Debug, Clone)]
pub struct TunnelConnector {
    url: Url,
}

impl TunnelConnector {
    /// Parse and validate the relay URL. Only `ws://` and `wss://` are
    /// accepted.
    pub fn new(tunnel_url: &str) -> Result<Self, TunnelError> {
        let url = Url::parse(tunnel_url).map_err(|e| TunnelError::InvalidUrl {
            url: tunnel_url.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(TunnelError::InvalidUrl {
                    url: tunnel_url.to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                });
            }
        }

        if url.host_str().is_none() {
            return Err(TunnelError::InvalidUrl {
                url: tunnel_url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        debug!(%url, "tunnel connector created");

        Ok(Self { url })
    }

    /// Relay URL this connector dials.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open a channel for one resolved target. The destination handshake is
    /// sent before this returns, so the caller may relay payload immediately.
    pub async fn open(&self, target: &ProxyTarget) -> Result<TunnelChannel, TunnelError> {
        let hello = TunnelHello::from(target);
        TunnelChannel::establish(&self.url, &hello).await
    }
}
