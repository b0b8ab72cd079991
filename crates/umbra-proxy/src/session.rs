//! One tunnel session per accepted client connection.
//!
//! A session exclusively owns its client socket and the tunnel channel it
//! opens, and walks an explicit state machine:
//!
//! ```text
//! AwaitingFirstBytes -> Resolving -> Connecting -> Relaying -> Closing
//!                           |            |
//!                           v            v
//!                        Failed (400) Failed (reset)
//! ```
//!
//! Closing is reachable from every state and idempotent: closing a resource
//! that is already gone is a no-op. The client socket and channel are torn
//! down together on every exit path.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use umbra_proto::{
    resolve_target, TargetError, BAD_REQUEST_RESPONSE, CONNECTION_ESTABLISHED_RESPONSE,
};
use umbra_tunnel::{TunnelChannel, TunnelConnector, TunnelError, TunnelEvent};

use crate::registry::{SessionInfo, SessionRegistry};

/// Read buffer size for the client socket.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first inbound chunk from the client.
    AwaitingFirstBytes,
    /// Parsing the first chunk into a destination.
    Resolving,
    /// Opening the tunnel channel and sending the handshake.
    Connecting,
    /// Full-duplex verbatim pass-through.
    Relaying,
    /// Terminal: both resources closed (or closing).
    Closing,
    /// Terminal: parse or tunnel-establishment failure.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::AwaitingFirstBytes => "awaiting-first-bytes",
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a session ended early. Contained to the session; the listener and
/// other sessions never see these.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed first chunk: {0}")]
    BadRequest(#[from] TargetError),

    #[error("tunnel establishment failed: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("client I/O error: {0}")]
    ClientIo(#[from] std::io::Error),
}

/// Owns one client connection end to end.
pub struct TunnelSession {
    session_id: String,
    client: TcpStream,
    connector: TunnelConnector,
    registry: SessionRegistry,
    state: SessionState,
}

impl TunnelSession {
    pub fn new(client: TcpStream, connector: TunnelConnector, registry: SessionRegistry) -> Self {
        Self {
            session_id: format!("sess-{}", uuid::Uuid::new_v4()),
            client,
            connector,
            registry,
            state: SessionState::AwaitingFirstBytes,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drive the session to completion, registering it for the duration.
    pub async fn run(mut self) {
        let peer_addr = match self.client.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                debug!("[{}] client gone before start: {}", self.session_id, e);
                return;
            }
        };

        self.registry.register(SessionInfo {
            session_id: self.session_id.clone(),
            peer_addr,
            state: self.state,
            target: None,
        });

        let result = self.drive().await;

        self.registry.deregister(&self.session_id);

        match result {
            Ok(()) => debug!("[{}] session finished", self.session_id),
            Err(e) => debug!("[{}] session ended: {}", self.session_id, e),
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!("[{}] {} -> {}", self.session_id, self.state, next);
        self.state = next;
        self.registry.update_state(&self.session_id, next);
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        // Awaiting-First-Bytes
        let mut first_chunk = vec![0u8; READ_BUFFER_SIZE];
        let n = self.client.read(&mut first_chunk).await?;
        if n == 0 {
            self.transition(SessionState::Closing);
            return Ok(());
        }
        first_chunk.truncate(n);

        // Resolving: the destination comes from this single chunk only.
        self.transition(SessionState::Resolving);
        let target = match resolve_target(&first_chunk) {
            Ok(target) => target,
            Err(e) => {
                warn!("[{}] rejecting client: {}", self.session_id, e);
                self.transition(SessionState::Failed);
                let _ = self.client.write_all(BAD_REQUEST_RESPONSE).await;
                self.close_client().await;
                return Err(e.into());
            }
        };

        debug!(
            "[{}] target resolved: {}:{} (connect={})",
            self.session_id, target.host, target.port, target.is_connect
        );
        self.registry.set_target(&self.session_id, target.clone());

        // Connecting: the channel sends the destination handshake before
        // returning, so relayed payload can never precede it.
        self.transition(SessionState::Connecting);
        let mut channel = match self.connector.open(&target).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(
                    "[{}] tunnel unavailable, resetting client: {}",
                    self.session_id, e
                );
                self.transition(SessionState::Failed);
                self.close_client().await;
                return Err(e.into());
            }
        };

        if target.is_connect {
            // The CONNECT request itself is never forwarded into the tunnel.
            if let Err(e) = self.client.write_all(CONNECTION_ESTABLISHED_RESPONSE).await {
                self.teardown(&mut channel).await;
                return Err(e.into());
            }
        } else {
            // Forward mode: the first chunk is the start of the real request.
            if let Err(e) = channel.send(&first_chunk).await {
                self.teardown(&mut channel).await;
                return Err(e.into());
            }
        }

        // Relaying
        self.transition(SessionState::Relaying);
        self.relay(&mut channel).await;

        self.teardown(&mut channel).await;
        Ok(())
    }

    /// Full-duplex pass-through. Returns when either side closes or errors;
    /// the caller tears both resources down.
    async fn relay(&mut self, channel: &mut TunnelChannel) {
        let session_id = self.session_id.clone();
        let (mut client_rx, mut client_tx) = self.client.split();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                read = client_rx.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            debug!("[{}] client closed", session_id);
                            return;
                        }
                        Ok(n) => {
                            if !channel.is_open() {
                                // Drop rather than queue; the channel is gone
                                // and teardown follows immediately.
                                debug!("[{}] channel not open, dropping {} bytes", session_id, n);
                                return;
                            }
                            if channel.send(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            debug!("[{}] client read error: {}", session_id, e);
                            return;
                        }
                    }
                }
                event = channel.recv() => {
                    match event {
                        TunnelEvent::Data(data) => {
                            if let Err(e) = client_tx.write_all(&data).await {
                                debug!("[{}] client write error: {}", session_id, e);
                                return;
                            }
                        }
                        TunnelEvent::Closed => {
                            debug!("[{}] tunnel closed", session_id);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Close both resources. Safe from any state; both closes are no-ops if
    /// the resource is already gone.
    async fn teardown(&mut self, channel: &mut TunnelChannel) {
        self.transition(SessionState::Closing);
        channel.close().await;
        self.close_client().await;
    }

    async fn close_client(&mut self) {
        if self.state != SessionState::Closing {
            self.transition(SessionState::Closing);
        }
        if let Err(e) = self.client.shutdown().await {
            trace!("[{}] client shutdown: {}", self.session_id, e);
        }
    }
}
