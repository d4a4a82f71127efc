use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ludo_core::net::messages::{AckMsg, ServerMessage};
use ludo_core::net::protocol::decode_server_message;
use ludo_core::test_helpers::{encode_event, join_data};

use ludo_server::build_app;
use ludo_server::config::{AuthFileConfig, ServerConfig};
use ludo_server::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server whose admin endpoints require a bearer token.
    pub async fn with_auth(token: &str) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                bearer_token: Some(token.to_string()),
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL carrying a handshake identity.
    pub fn ws_url(&self, player_id: &str, player_name: &str) -> String {
        format!(
            "ws://{}/ws?playerId={player_id}&playerName={player_name}",
            self.addr
        )
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Connect as `player_id` and join `room_id` with the given pawns.
/// Returns the stream and the join acknowledgment.
pub async fn ws_connect_and_join(
    server: &TestServer,
    room_id: &str,
    player_id: &str,
    pawns: &[&str],
) -> (WsStream, AckMsg) {
    let mut stream = ws_connect(&server.ws_url(player_id, player_id)).await;
    ws_send_event(
        &mut stream,
        "join",
        1,
        join_data(room_id, player_id, player_id, pawns),
    )
    .await;
    let (_, ack) = ws_read_until_ack(&mut stream).await;
    assert!(ack.success, "Expected successful join: {ack:?}");
    (stream, ack)
}

/// Send one client event with the given ack id.
pub async fn ws_send_event(stream: &mut WsStream, kind: &str, ack: u32, data: Value) {
    let encoded = encode_event(kind, Some(ack), data);
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read raw binary data, returning None on timeout.
pub async fn ws_try_read_raw(stream: &mut WsStream, timeout_ms: u64) -> Option<Vec<u8>> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Read messages until the direct acknowledgment arrives. Returns the
/// broadcasts seen before it, in order, and the ack itself.
pub async fn ws_read_until_ack(stream: &mut WsStream) -> (Vec<ServerMessage>, AckMsg) {
    let mut broadcasts = Vec::new();
    loop {
        match ws_read_server_msg(stream).await {
            ServerMessage::Ack(ack) => return (broadcasts, ack),
            other => broadcasts.push(other),
        }
    }
}

/// Wait for the server to close the connection (5s timeout). Returns any
/// binary frames delivered before the close.
pub async fn ws_read_until_closed(stream: &mut WsStream) -> Vec<ServerMessage> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        let mut seen = Vec::new();
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    seen.push(decode_server_message(&data).unwrap());
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return seen,
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket close")
}

/// Poll until `check` holds for the server state (2s timeout).
pub async fn wait_for<F>(state: &AppState, check: F)
where
    F: Fn(&ludo_server::session::SessionStats) -> bool,
{
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            let stats = state.sessions.read().await.stats();
            if check(&stats) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for session state");
}
