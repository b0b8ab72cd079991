//! A single tunnel channel: one WebSocket connection carrying one logical
//! client connection.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tracing::{debug, trace, warn};
use umbra_proto::TunnelHello;
use url::Url;

use crate::TunnelError;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What the relay side produced next.
#[derive(Debug)]
pub enum TunnelEvent {
    /// Opaque payload bytes to write to the client verbatim.
    Data(Bytes),
    /// The channel closed or errored; the session must tear down.
    Closed,
}

/// Duplex message channel to the relay, owned by exactly one session.
///
/// Created by [`TunnelConnector::open`](crate::TunnelConnector::open), which
/// guarantees the destination handshake is the first message sent. Closing is
/// idempotent; read errors are collapsed into [`TunnelEvent::Closed`] since a
/// broken channel and a closed one require the same teardown.
pub struct TunnelChannel {
    channel_id: String,
    sink: SplitSink<WsStream, Message>,
    source: SplitStream<WsStream>,
    open: bool,
}

impl std::fmt::Debug for TunnelChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelChannel")
            .field("channel_id", &self.channel_id)
            .field("open", &self.open)
            .finish()
    }
}

impl TunnelChannel {
    /// Dial the relay and send the destination handshake as the first
    /// message on the wire.
    pub(crate) async fn establish(url: &Url, hello: &TunnelHello) -> Result<Self, TunnelError> {
        let channel_id = format!("tunnel-{}", uuid::Uuid::new_v4());

        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TunnelError::ConnectFailed(e.to_string()))?;

        debug!(
            "[{}] channel opened to {} for {}:{}",
            channel_id, url, hello.host, hello.port
        );

        let (mut sink, source) = ws_stream.split();

        let hello_json = hello
            .to_json()
            .map_err(|e| TunnelError::HandshakeFailed(e.to_string()))?;
        sink.send(Message::Text(hello_json))
            .await
            .map_err(|e| TunnelError::HandshakeFailed(e.to_string()))?;

        Ok(Self {
            channel_id,
            sink,
            source,
            open: true,
        })
    }

    /// Whether the channel is still ready to carry payload.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Forward one chunk of client bytes into the tunnel.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TunnelError> {
        if !self.open {
            return Err(TunnelError::ChannelClosed);
        }

        if let Err(e) = self.sink.send(Message::Binary(data.to_vec())).await {
            self.open = false;
            warn!("[{}] tunnel send failed: {}", self.channel_id, e);
            return Err(TunnelError::ChannelClosed);
        }

        trace!("[{}] sent {} payload bytes", self.channel_id, data.len());
        Ok(())
    }

    /// Wait for the next event from the relay.
    pub async fn recv(&mut self) -> TunnelEvent {
        loop {
            match self.source.next().await {
                Some(Ok(Message::Binary(payload))) => {
                    trace!(
                        "[{}] received {} payload bytes",
                        self.channel_id,
                        payload.len()
                    );
                    return TunnelEvent::Data(Bytes::from(payload));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pong is handled by tungstenite; nothing to relay.
                    continue;
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("[{}] relay closed the channel", self.channel_id);
                    self.open = false;
                    return TunnelEvent::Closed;
                }
                Some(Ok(other)) => {
                    warn!(
                        "[{}] ignoring non-binary tunnel message: {:?}",
                        self.channel_id, other
                    );
                    continue;
                }
                Some(Err(e)) => {
                    warn!("[{}] tunnel read error: {}", self.channel_id, e);
                    self.open = false;
                    return TunnelEvent::Closed;
                }
                None => {
                    debug!("[{}] tunnel stream ended", self.channel_id);
                    self.open = false;
                    return TunnelEvent::Closed;
                }
            }
        }
    }

    /// Close the channel. Safe to call more than once and after a remote
    /// close; a close failure only means the connection is already gone.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        if let Err(e) = self.sink.send(Message::Close(None)).await {
            trace!("[{}] close frame not sent: {}", self.channel_id, e);
        }
        let _ = self.sink.close().await;

        debug!("[{}] tunnel channel closed", self.channel_id);
    }

    /// Identifier used in logs, unique per channel.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}
