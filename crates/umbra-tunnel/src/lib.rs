//! WebSocket tunnel channel to the relay endpoint, built on tokio-tungstenite.
//!
//! Each proxied client connection gets its own channel: one WebSocket
//! connection to the configured relay URL, opened lazily when the client's
//! first bytes arrive. The first message on a fresh channel is always the
//! JSON handshake announcing the destination; every message after that is an
//! opaque binary payload in either direction. There is deliberately no
//! stream multiplexing — one channel carries exactly one logical connection.

pub mod channel;
pub mod connector;

pub use channel::{TunnelChannel, TunnelEvent};
pub use connector::TunnelConnector;

use thiserror::Error;

/// Errors from establishing or driving a tunnel channel.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid tunnel URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to relay: {0}")]
    ConnectFailed(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("tunnel channel is closed")]
    ChannelClosed,
}
