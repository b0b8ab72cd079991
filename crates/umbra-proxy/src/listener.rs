//! Loopback listener: accepts client connections, spawns one session each.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use umbra_tunnel::TunnelConnector;

use crate::registry::SessionRegistry;
use crate::session::TunnelSession;
use crate::ProxyError;

/// TCP listener on `127.0.0.1:<port>`. Each accepted connection is handed to
/// a fresh [`TunnelSession`] on its own task; nothing a session does can
/// block the accept loop or another session.
pub struct LocalListener {
    tcp_listener: TcpListener,
    local_addr: SocketAddr,
    connector: TunnelConnector,
    registry: SessionRegistry,
}

impl std::fmt::Debug for LocalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl LocalListener {
    /// Bind the loopback socket. A bind failure is returned to the caller
    /// and never retried; the selector decides what happens next.
    pub async fn bind(port: u16, connector: TunnelConnector) -> Result<Self, ProxyError> {
        let tcp_listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| ProxyError::BindError {
                port,
                reason: e.to_string(),
            })?;

        let local_addr = tcp_listener.local_addr().map_err(|e| ProxyError::BindError {
            port,
            reason: e.to_string(),
        })?;

        info!("local proxy listening on {}", local_addr);

        Ok(Self {
            tcp_listener,
            local_addr,
            connector,
            registry: SessionRegistry::new(),
        })
    }

    /// Address actually bound, with the resolved port when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the live-session registry.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Run the accept loop. Accept errors are logged and skipped; no
    /// connection-count limit is imposed here.
    pub async fn serve(self) {
        loop {
            match self.tcp_listener.accept().await {
                Ok((client, peer_addr)) => {
                    debug!("accepted client connection from {}", peer_addr);
                    let session = TunnelSession::new(
                        client,
                        self.connector.clone(),
                        self.registry.clone(),
                    );
                    tokio::spawn(session.run());
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                }
            }
        }
    }
}
