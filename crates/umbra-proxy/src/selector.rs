//! Startup proxy-route selection.
//!
//! Runs exactly once per process: try to start the local listener and route
//! the embedding host's outbound HTTP/HTTPS traffic through it; on any
//! startup failure, route the host directly through the static fallback
//! proxy instead. Both branches are explicit results, never thrown-error
//! control flow, and the choice is not re-evaluated after startup.

use async_trait::async_trait;
use tracing::{info, warn};

use umbra_tunnel::TunnelConnector;

use crate::config::RelayConfig;
use crate::listener::LocalListener;
use crate::ProxyError;

/// Seam to the embedding host: apply an outbound proxy setting to its
/// network stack. The host supplies the real implementation.
#[async_trait]
pub trait HostConfigurator: Send + Sync {
    /// Route the host's outbound HTTP/HTTPS traffic per `proxy_rules`,
    /// either `http=127.0.0.1:<port>;https=127.0.0.1:<port>` or a plain
    /// `host:port` fallback address.
    async fn set_outbound_proxy(&self, proxy_rules: &str) -> Result<(), ProxyError>;
}

/// Outcome of the startup routine.
#[derive(Debug)]
pub enum ProxySelection {
    /// The local listener started; host traffic loops through it.
    Local {
        listener: LocalListener,
        proxy_rules: String,
    },
    /// The listener could not start; host traffic goes straight to the
    /// static fallback proxy.
    Fallback { proxy_rules: String, reason: String },
}

impl ProxySelection {
    pub fn proxy_rules(&self) -> &str {
        match self {
            ProxySelection::Local { proxy_rules, .. } => proxy_rules,
            ProxySelection::Fallback { proxy_rules, .. } => proxy_rules,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ProxySelection::Local { .. })
    }
}

/// Proxy rules string routing both schemes through the loopback listener.
pub fn local_proxy_rules(port: u16) -> String {
    format!("http=127.0.0.1:{0};https=127.0.0.1:{0}", port)
}

/// Attempt to start the local listener and configure the host accordingly.
///
/// Startup failures (unusable tunnel URL, bind failure) select the fallback
/// branch; only a failure to apply the chosen setting to the host itself is
/// an error.
pub async fn select_proxy_route(
    config: &RelayConfig,
    host: &dyn HostConfigurator,
) -> Result<ProxySelection, ProxyError> {
    let selection = match start_local_listener(config).await {
        Ok(listener) => {
            let proxy_rules = local_proxy_rules(listener.local_addr().port());
            info!("routing host traffic through local listener: {}", proxy_rules);
            ProxySelection::Local {
                listener,
                proxy_rules,
            }
        }
        Err(e) => {
            warn!(
                "local listener unavailable, falling back to static proxy {}: {}",
                config.fallback_proxy, e
            );
            ProxySelection::Fallback {
                proxy_rules: config.fallback_proxy.clone(),
                reason: e.to_string(),
            }
        }
    };

    host.set_outbound_proxy(selection.proxy_rules()).await?;

    Ok(selection)
}

/// The "attempt to start" operation: validate the tunnel URL (the runtime
/// capability check), then bind the loopback socket.
async fn start_local_listener(config: &RelayConfig) -> Result<LocalListener, ProxyError> {
    let connector = TunnelConnector::new(&config.tunnel_url)?;
    LocalListener::bind(config.local_listen_port, connector).await
}
