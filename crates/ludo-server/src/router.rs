//! Turns one client event into room broadcasts and an acknowledgment for the
//! connection that sent it.

use serde_json::Value;

use ludo_core::net::messages::{
    AckMsg, AckResult, CaptureAckMsg, CapturePayload, ClientMessage, EventFrame, JoinPayload,
    MoveAckMsg, MovePayload, ScoresMsg, ServerMessage,
};
use ludo_core::net::protocol::encode_server_message;
use ludo_core::scoring::{CaptureOutcome, MoveOutcome, ScoreSnapshot};
use ludo_core::validation::{EventKind, ValidationError, parse_payload};

use crate::auth::Identity;
use crate::session::{AuthorizationError, ConnectionId, PlayerSender};
use crate::state::AppState;

/// The live connection an event arrived on.
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    pub sender: PlayerSender,
}

/// Why an event was rejected. Only ever reported to the sender.
#[derive(Debug)]
pub enum EventError {
    Validation(ValidationError),
    Authorization(AuthorizationError),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{e}"),
            Self::Authorization(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EventError {}

impl From<ValidationError> for EventError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<AuthorizationError> for EventError {
    fn from(e: AuthorizationError) -> Self {
        Self::Authorization(e)
    }
}

enum EventReply {
    Joined(ScoreSnapshot),
    Moved(MoveOutcome),
    Captured(CaptureOutcome),
}

impl EventReply {
    fn into_ack(self, ack: Option<u32>) -> AckMsg {
        match self {
            Self::Joined(scores) => AckMsg::joined(ack, scores),
            Self::Moved(outcome) => AckMsg::with_result(ack, AckResult::Move(outcome)),
            Self::Captured(outcome) => AckMsg::with_result(ack, AckResult::Capture(outcome)),
        }
    }
}

/// Process one client event to completion and return the acknowledgment for
/// its sender. Rejected events change nothing and broadcast nothing.
pub async fn handle_event(state: &AppState, conn: &Connection, msg: ClientMessage) -> AckMsg {
    let kind = msg.kind();
    let EventFrame { ack, data } = msg.into_frame();

    let result = match kind {
        EventKind::Join => handle_join(state, conn, &data).await,
        EventKind::Move => handle_move(state, conn, &data).await,
        EventKind::Capture => handle_capture(state, conn, &data).await,
    };

    match result {
        Ok(reply) => reply.into_ack(ack),
        Err(e) => {
            tracing::warn!(
                conn_id = %conn.id,
                player_id = %conn.identity.player_id,
                event = %kind,
                error = %e,
                "Event rejected"
            );
            AckMsg::failure(ack, e.to_string())
        },
    }
}

async fn handle_join(
    state: &AppState,
    conn: &Connection,
    data: &Value,
) -> Result<EventReply, EventError> {
    let join: JoinPayload = parse_payload(EventKind::Join, data)?;

    state
        .sessions
        .write()
        .await
        .register(conn.id, &conn.identity, &join.room_id)?;
    state
        .hub
        .write()
        .await
        .subscribe(&join.room_id, conn.id, conn.sender.clone());

    state
        .scoring
        .set_initial_pawns(&join.room_id, &join.player_id, &join.pawn_ids());
    let scores = state.scoring.get_scores(&join.room_id);

    broadcast(
        state,
        &join.room_id,
        &ServerMessage::Scores(ScoresMsg {
            room_id: join.room_id.clone(),
            scores: scores.clone(),
        }),
    )
    .await;

    tracing::info!(
        conn_id = %conn.id,
        room_id = %join.room_id,
        player_id = %join.player_id,
        player_name = %join.player_name,
        "Player joined room"
    );
    Ok(EventReply::Joined(scores))
}

async fn handle_move(
    state: &AppState,
    conn: &Connection,
    data: &Value,
) -> Result<EventReply, EventError> {
    let mv: MovePayload = parse_payload(EventKind::Move, data)?;
    state
        .sessions
        .read()
        .await
        .validate_room_access(conn.id, &mv.room_id)?;

    let outcome = state
        .scoring
        .update_pawn_score(&mv.room_id, &mv.player_id, &mv.pawn_id, mv.steps);

    broadcast_scores(state, &mv.room_id).await;
    broadcast(
        state,
        &mv.room_id,
        &ServerMessage::MoveAck(MoveAckMsg {
            player_id: mv.player_id,
            pawn_id: mv.pawn_id,
            steps: mv.steps,
            bonus: outcome.bonus,
            player_total: outcome.player_total,
        }),
    )
    .await;

    Ok(EventReply::Moved(outcome))
}

async fn handle_capture(
    state: &AppState,
    conn: &Connection,
    data: &Value,
) -> Result<EventReply, EventError> {
    let capture: CapturePayload = parse_payload(EventKind::Capture, data)?;
    state
        .sessions
        .read()
        .await
        .validate_room_access(conn.id, &capture.room_id)?;

    let outcome =
        state
            .scoring
            .handle_capture(&capture.room_id, &capture.striker, &capture.victim);

    broadcast_scores(state, &capture.room_id).await;
    broadcast(
        state,
        &capture.room_id,
        &ServerMessage::CaptureAck(CaptureAckMsg {
            striker: capture.striker,
            victim: capture.victim,
            result: outcome,
        }),
    )
    .await;

    Ok(EventReply::Captured(outcome))
}

async fn broadcast_scores(state: &AppState, room_id: &str) {
    let scores = state.scoring.get_scores(room_id);
    broadcast(
        state,
        room_id,
        &ServerMessage::Scores(ScoresMsg {
            room_id: room_id.to_string(),
            scores,
        }),
    )
    .await;
}

async fn broadcast(state: &AppState, room_id: &str, msg: &ServerMessage) {
    match encode_server_message(msg) {
        Ok(data) => state.hub.read().await.broadcast_to_room(room_id, &data),
        Err(e) => tracing::warn!(room_id, error = %e, "Failed to encode broadcast"),
    }
}
