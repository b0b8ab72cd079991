//! Local forward-proxy core.
//!
//! Accepts a client's outbound HTTP/HTTPS connections on a loopback port and
//! relays each one through its own WebSocket tunnel channel to a remote relay
//! endpoint, so all egress traffic appears to originate there.
//!
//! The pieces, leaves first:
//! - [`config`]: process-wide [`RelayConfig`], read once at startup.
//! - [`registry`]: concurrent-safe map of live sessions, observability only.
//! - [`session`]: one [`TunnelSession`] per accepted connection, an explicit
//!   state machine that owns the client socket and its tunnel channel.
//! - [`listener`]: the loopback accept loop, one spawned task per session.
//! - [`selector`]: the startup routine that either routes the embedding host
//!   through the local listener or falls back to a static HTTP proxy.

pub mod config;
pub mod listener;
pub mod registry;
pub mod selector;
pub mod session;

pub use config::RelayConfig;
pub use listener::LocalListener;
pub use registry::{SessionInfo, SessionRegistry};
pub use selector::{local_proxy_rules, select_proxy_route, HostConfigurator, ProxySelection};
pub use session::{SessionState, TunnelSession};

use thiserror::Error;
use umbra_tunnel::TunnelError;

/// Errors surfaced by the proxy core.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind 127.0.0.1:{port}: {reason}")]
    BindError { port: u16, reason: String },

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("host proxy configuration failed: {0}")]
    HostConfig(String),
}
