use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub rooms: RoomInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    /// Connections that have joined a room.
    pub sessions: usize,
    pub players: usize,
}

#[derive(Serialize)]
pub struct RoomInfo {
    /// Rooms holding score state.
    pub scored: usize,
    /// Rooms with at least one live subscriber.
    pub active: usize,
}

/// Returns server status, connection counts and room counts as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let websocket = state.ws_connection_count.load(Ordering::Relaxed);
    let stats = state.sessions.read().await.stats();
    let active = state.hub.read().await.room_count();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo {
            websocket,
            sessions: stats.total_connections,
            players: stats.total_players,
        },
        rooms: RoomInfo {
            scored: state.scoring.room_count(),
            active,
        },
    })
}
