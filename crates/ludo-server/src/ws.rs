use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequest, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ludo_core::net::messages::{AckMsg, ServerMessage};
use ludo_core::net::protocol::{decode_client_message, encode_server_message};

use crate::auth::{Handshake, Identity, authenticate};
use crate::error::AppError;
use crate::router::{self, Connection};
use crate::session::{ConnectionHandle, ConnectionId};
use crate::state::{AppState, ConnectionGuard};

const RATE_LIMITED: &str = "Rate limited";

/// `GET /ws?playerId=…&playerName=…`. The handshake is checked before the
/// upgrade; a rejected identity never gets a socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, AppError> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(AppError::ServiceUnavailable(
            "Connection limit reached".to_string(),
        ));
    }

    let handshake = Query::<Handshake>::try_from_uri(request.uri())
        .map(|Query(h)| h)
        .unwrap_or_default();
    let identity = authenticate(&handshake).map_err(|e| {
        tracing::warn!(
            player_id = ?handshake.player_id,
            error = %e,
            "WebSocket handshake rejected"
        );
        AppError::Unauthorized(e.to_string())
    })?;

    // Perform WebSocket upgrade manually
    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let conn_id = ConnectionId::new();
    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let shutdown = CancellationToken::new();

    state.sessions.write().await.attach(
        conn_id,
        ConnectionHandle {
            sender: tx.clone(),
            shutdown: shutdown.clone(),
        },
    );
    spawn_writer(ws_sender, rx, shutdown.clone());

    tracing::info!(
        conn_id = %conn_id,
        player_id = %identity.player_id,
        player_name = %identity.player_name,
        "Connection authenticated"
    );

    let conn = Connection {
        id: conn_id,
        identity,
        sender: tx,
    };
    read_loop(&mut ws_receiver, &state, &conn, &shutdown).await;

    // Connection gone; clean up exactly once.
    state.hub.write().await.unsubscribe(conn_id);
    let session = state.sessions.write().await.unregister(conn_id);
    let forced = shutdown.is_cancelled();
    shutdown.cancel();

    tracing::info!(
        conn_id = %conn_id,
        player_id = %conn.identity.player_id,
        room_id = session.as_ref().map_or("", |s| s.room_id.as_str()),
        forced,
        "Player disconnected"
    );
}

/// Drain the outbound channel into the socket. On shutdown, anything already
/// queued is still delivered before the close frame.
fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                data = rx.recv() => {
                    let Some(data) = data else { break };
                    if ws_sender.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                },
                () = shutdown.cancelled() => {
                    if let Err(e) = ws_sender.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    break;
                },
            }
        }
    });
}

/// Per-connection event allowance. Starts full at `burst` events and
/// refills continuously at `per_sec`, never above `burst`.
struct EventBudget {
    available: f64,
    burst: f64,
    per_sec: f64,
    refilled_at: Instant,
}

impl EventBudget {
    fn new(burst: u32, per_sec: f64, now: Instant) -> Self {
        let burst = f64::from(burst);
        Self {
            available: burst,
            burst,
            per_sec,
            refilled_at: now,
        }
    }

    /// Spend one event if the budget allows it at `now`.
    fn try_spend(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.available = (self.available + elapsed * self.per_sec).min(self.burst);
        self.refilled_at = now;

        if self.available < 1.0 {
            return false;
        }
        self.available -= 1.0;
        true
    }
}

async fn send_ack(conn: &Connection, ack: AckMsg) -> bool {
    match encode_server_message(&ServerMessage::Ack(ack)) {
        Ok(bytes) => conn.sender.send(Bytes::from(bytes)).await.is_ok(),
        Err(e) => {
            tracing::warn!(conn_id = %conn.id, error = %e, "Failed to encode ack");
            true
        },
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn: &Connection,
    shutdown: &CancellationToken,
) {
    let limits = &state.config.limits;
    let mut budget = EventBudget::new(
        limits.ws_rate_burst,
        limits.ws_rate_limit_per_sec,
        Instant::now(),
    );

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = ws_receiver.next() => next,
        };
        let Some(Ok(msg)) = next else { break };

        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(conn_id = %conn.id, error = %e, "Dropping undecodable frame");
                continue;
            },
        };

        let ack = if budget.try_spend(Instant::now()) {
            router::handle_event(state, conn, client_msg).await
        } else {
            tracing::warn!(
                conn_id = %conn.id,
                player_id = %conn.identity.player_id,
                event = %client_msg.kind(),
                "Rate limited"
            );
            AckMsg::failure(client_msg.frame().ack, RATE_LIMITED)
        };
        if !send_ack(conn, ack).await {
            break;
        }
    }
}
