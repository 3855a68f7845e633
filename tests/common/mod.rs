#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use chess_core::{ClientMessage, MoveRequest, ServerMessage};
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a fresh server (and game) on an ephemeral port.
pub async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let config = server::config::Config {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        public_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/public").into(),
    };
    tokio::spawn(async move {
        server::serve(listener, config).await.expect("Server error");
    });
    addr
}

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

pub async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to open websocket");
    socket
}

/// Next server message, failing the test after two seconds of silence.
pub async fn recv(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Timed out waiting for a message")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("Unexpected server message");
        }
    }
}

/// Assert nothing arrives for a short while.
pub async fn assert_quiet(socket: &mut Socket) {
    if let Ok(frame) = tokio::time::timeout(Duration::from_millis(300), socket.next()).await {
        panic!("Expected silence, got {frame:?}");
    }
}

pub async fn send_move(socket: &mut Socket, request: MoveRequest) {
    let json = serde_json::to_string(&ClientMessage::Move(request)).expect("Encode move");
    socket
        .send(Message::text(json))
        .await
        .expect("Failed to send move");
}

pub async fn send_raw(socket: &mut Socket, text: &str) {
    socket
        .send(Message::text(text.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Close the socket and wait until the server has seen it go.
pub async fn hang_up(mut socket: Socket) {
    socket.close(None).await.expect("Failed to close");
    while let Some(Ok(_)) = socket.next().await {}
    tokio::time::sleep(Duration::from_millis(100)).await;
}
