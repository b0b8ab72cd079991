//! Tunnel channel tests against a minimal in-process WebSocket server.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use umbra_proto::ProxyTarget;
use umbra_tunnel::{TunnelConnector, TunnelError, TunnelEvent};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn target() -> ProxyTarget {
    ProxyTarget {
        host: "example.com".to_string(),
        port: 443,
        is_connect: true,
    }
}

/// Accept a single WebSocket connection and hand it to the test.
async fn spawn_ws_server() -> (SocketAddr, mpsc::Receiver<WebSocketStream<TcpStream>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = tx.send(ws).await;
        }
    });

    (addr, rx)
}

#[tokio::test]
async fn test_handshake_is_first_message() {
    let (addr, mut server_rx) = spawn_ws_server().await;
    let connector = TunnelConnector::new(&format!("ws://{}/tunnel", addr)).unwrap();

    let mut channel = connector.open(&target()).await.unwrap();
    channel.send(b"payload-after-handshake").await.unwrap();

    let mut server = timeout(TEST_TIMEOUT, server_rx.recv())
        .await
        .unwrap()
        .unwrap();

    match timeout(TEST_TIMEOUT, server.next()).await.unwrap() {
        Some(Ok(Message::Text(text))) => {
            assert_eq!(text, r#"{"host":"example.com","port":443}"#);
        }
        other => panic!("expected text handshake first, got {:?}", other),
    }

    match timeout(TEST_TIMEOUT, server.next()).await.unwrap() {
        Some(Ok(Message::Binary(payload))) => {
            assert_eq!(payload, b"payload-after-handshake");
        }
        other => panic!("expected binary payload second, got {:?}", other),
    }
}

#[tokio::test]
async fn test_recv_surfaces_remote_close() {
    let (addr, mut server_rx) = spawn_ws_server().await;
    let connector = TunnelConnector::new(&format!("ws://{}/tunnel", addr)).unwrap();

    let mut channel = connector.open(&target()).await.unwrap();
    let mut server = timeout(TEST_TIMEOUT, server_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let _hello = server.next().await;

    server.close(None).await.unwrap();

    match timeout(TEST_TIMEOUT, channel.recv()).await.unwrap() {
        TunnelEvent::Closed => {}
        TunnelEvent::Data(data) => panic!("unexpected payload: {:?}", data),
    }
    assert!(!channel.is_open());

    // Closing an already-closed channel is a no-op.
    channel.close().await;
    channel.close().await;
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let (addr, mut server_rx) = spawn_ws_server().await;
    let connector = TunnelConnector::new(&format!("ws://{}/tunnel", addr)).unwrap();

    let mut channel = connector.open(&target()).await.unwrap();
    let _server = timeout(TEST_TIMEOUT, server_rx.recv())
        .await
        .unwrap()
        .unwrap();

    channel.close().await;

    match channel.send(b"late").await {
        Err(TunnelError::ChannelClosed) => {}
        other => panic!("expected ChannelClosed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    // Nothing is listening here.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let connector = TunnelConnector::new(&format!("ws://{}/tunnel", addr)).unwrap();
    match connector.open(&target()).await {
        Err(TunnelError::ConnectFailed(_)) => {}
        other => panic!("expected ConnectFailed, got {:?}", other),
    }
}
