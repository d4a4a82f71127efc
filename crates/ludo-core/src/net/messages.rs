use serde::{Deserialize, Serialize};

use crate::room::{PawnId, PlayerId, RoomId};
use crate::scoring::{CaptureOutcome, MoveOutcome, PawnRef, ScoreSnapshot};
use crate::validation::EventKind;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    Join = 0x01,
    Move = 0x02,
    Capture = 0x03,

    // Server -> Client
    Ack = 0x10,
    Scores = 0x11,
    MoveAck = 0x12,
    CaptureAck = 0x13,
    AuthDisconnect = 0x14,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::Move),
            0x03 => Some(Self::Capture),
            0x10 => Some(Self::Ack),
            0x11 => Some(Self::Scores),
            0x12 => Some(Self::MoveAck),
            0x13 => Some(Self::CaptureAck),
            0x14 => Some(Self::AuthDisconnect),
            _ => None,
        }
    }
}

/// Envelope for every client event. `data` stays untyped until it has been
/// checked against the event's schema. `ack` is echoed back in the direct
/// acknowledgment so the client can match responses to requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u32>,
    pub data: serde_json::Value,
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Join(EventFrame),
    Move(EventFrame),
    Capture(EventFrame),
}

impl ClientMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join(_) => EventKind::Join,
            Self::Move(_) => EventKind::Move,
            Self::Capture(_) => EventKind::Capture,
        }
    }

    pub fn frame(&self) -> &EventFrame {
        match self {
            Self::Join(f) | Self::Move(f) | Self::Capture(f) => f,
        }
    }

    pub fn into_frame(self) -> EventFrame {
        match self {
            Self::Join(f) | Self::Move(f) | Self::Capture(f) => f,
        }
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ack(AckMsg),
    Scores(ScoresMsg),
    MoveAck(MoveAckMsg),
    CaptureAck(CaptureAckMsg),
    AuthDisconnect(AuthDisconnectMsg),
}

// ============================================================================
// Event payloads (typed form, produced after validation)
// ============================================================================

/// A pawn declared by a player on join. Only the id affects scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PawnSpec {
    pub pawn_id: PawnId,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub at_home: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub player_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pawns: Vec<PawnSpec>,
}

impl JoinPayload {
    pub fn pawn_ids(&self) -> Vec<PawnId> {
        self.pawns.iter().map(|p| p.pawn_id.clone()).collect()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<PawnSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<PawnSpec>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub pawn_id: PawnId,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    pub room_id: RoomId,
    pub striker: PawnRef,
    pub victim: PawnRef,
}

// ============================================================================
// Server messages
// ============================================================================

/// Event-specific result carried by a successful acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckResult {
    Move(MoveOutcome),
    Capture(CaptureOutcome),
}

/// Direct, single-shot response to the connection that sent an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u32>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AckResult>,
}

impl AckMsg {
    pub fn failure(ack: Option<u32>, error: impl Into<String>) -> Self {
        Self {
            ack,
            success: false,
            error: Some(error.into()),
            scores: None,
            result: None,
        }
    }

    pub fn joined(ack: Option<u32>, scores: ScoreSnapshot) -> Self {
        Self {
            ack,
            success: true,
            error: None,
            scores: Some(scores),
            result: None,
        }
    }

    pub fn with_result(ack: Option<u32>, result: AckResult) -> Self {
        Self {
            ack,
            success: true,
            error: None,
            scores: None,
            result: Some(result),
        }
    }
}

/// Room-wide score snapshot, broadcast after every accepted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoresMsg {
    pub room_id: RoomId,
    pub scores: ScoreSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAckMsg {
    pub player_id: PlayerId,
    pub pawn_id: PawnId,
    pub steps: u32,
    pub bonus: u32,
    pub player_total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAckMsg {
    pub striker: PawnRef,
    pub victim: PawnRef,
    pub result: CaptureOutcome,
}

/// Sent right before the server forcibly closes a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDisconnectMsg {
    pub reason: String,
}
