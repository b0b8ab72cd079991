//! Umbra Protocol Definitions
//!
//! This crate defines the proxy data model: the per-connection target
//! resolved from a client's first bytes, the handshake record sent to the
//! relay, and the canned HTTP responses the local proxy writes itself.

pub mod handshake;
pub mod target;

pub use handshake::TunnelHello;
pub use target::{resolve_target, ProxyTarget, TargetError};

/// Response written to the client when the first chunk cannot be parsed.
pub const BAD_REQUEST_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// Response written to the client once a CONNECT tunnel is established.
pub const CONNECTION_ESTABLISHED_RESPONSE: &[u8] =
    b"HTTP/1.1 200 Connection Established\r\n\r\n";
