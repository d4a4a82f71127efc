use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use ludo_core::room::{RoomId, is_valid_room_id};
use ludo_core::scoring::ScoreSnapshot;

use crate::error::AppError;
use crate::session::SessionStats;
use crate::state::AppState;

const DEFAULT_DISCONNECT_REASON: &str = "disconnected by server";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoresResponse {
    pub ok: bool,
    pub room_id: RoomId,
    pub scores: ScoreSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisconnectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub disconnected: usize,
}

/// GET /api/v1/scores/{room_id} returns current aggregate scores for a room.
/// Unknown rooms report an empty map and are not created.
pub async fn get_scores(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ScoresResponse>, AppError> {
    if !is_valid_room_id(&room_id) {
        return Err(AppError::BadRequest("Invalid room id".to_string()));
    }
    let scores = state.scoring.get_scores(&room_id);
    Ok(Json(ScoresResponse {
        ok: true,
        room_id,
        scores,
    }))
}

/// GET /api/v1/stats returns session registry counters.
pub async fn get_stats(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.sessions.read().await.stats())
}

/// POST /api/v1/players/{player_id}/disconnect closes every connection a
/// player has open, telling each one why first.
pub async fn disconnect_player(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(body): Json<DisconnectBody>,
) -> Result<Json<DisconnectResponse>, AppError> {
    let reason = body
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DISCONNECT_REASON.to_string());

    let disconnected = state
        .sessions
        .read()
        .await
        .disconnect_player(&player_id, &reason);
    if disconnected == 0 {
        return Err(AppError::NotFound(format!(
            "Player {player_id} has no active connections"
        )));
    }
    Ok(Json(DisconnectResponse { disconnected }))
}
