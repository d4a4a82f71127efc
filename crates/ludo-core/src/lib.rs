pub mod net;
pub mod room;
pub mod scoring;
pub mod validation;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use serde_json::{Value, json};

    use crate::net::messages::{ClientMessage, EventFrame};
    use crate::net::protocol::encode_client_message;
    use crate::scoring::PawnRef;

    pub fn pawn_ref(player_id: &str, pawn_id: &str) -> PawnRef {
        PawnRef {
            player_id: player_id.to_string(),
            pawn_id: pawn_id.to_string(),
        }
    }

    /// Payload for a `join` event declaring the given pawn ids.
    pub fn join_data(room_id: &str, player_id: &str, player_name: &str, pawns: &[&str]) -> Value {
        let pawns: Vec<Value> = pawns
            .iter()
            .map(|id| json!({"pawnId": id, "position": 0, "atHome": true}))
            .collect();
        json!({
            "roomId": room_id,
            "playerId": player_id,
            "playerName": player_name,
            "pawns": pawns,
        })
    }

    pub fn move_data(room_id: &str, player_id: &str, pawn_id: &str, steps: i64) -> Value {
        json!({
            "roomId": room_id,
            "playerId": player_id,
            "pawnId": pawn_id,
            "steps": steps,
        })
    }

    pub fn capture_data(room_id: &str, striker: (&str, &str), victim: (&str, &str)) -> Value {
        json!({
            "roomId": room_id,
            "striker": {"playerId": striker.0, "pawnId": striker.1},
            "victim": {"playerId": victim.0, "pawnId": victim.1},
        })
    }

    /// Wrap `data` in the client message matching its event name and encode it.
    pub fn encode_event(kind: &str, ack: Option<u32>, data: Value) -> Vec<u8> {
        let frame = EventFrame { ack, data };
        let msg = match kind {
            "join" => ClientMessage::Join(frame),
            "move" => ClientMessage::Move(frame),
            "capture" => ClientMessage::Capture(frame),
            other => panic!("unknown event kind: {other}"),
        };
        encode_client_message(&msg).unwrap()
    }
}
