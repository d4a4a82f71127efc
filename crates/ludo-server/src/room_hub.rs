use std::collections::HashMap;

use bytes::Bytes;

use ludo_core::room::RoomId;

use crate::session::{ConnectionId, PlayerSender};

/// Room broadcast channels: which connections receive a room's updates.
#[derive(Default)]
pub struct RoomHub {
    rooms: HashMap<RoomId, HashMap<ConnectionId, PlayerSender>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room's broadcast list. Subscribing twice keeps
    /// a single entry.
    pub fn subscribe(&mut self, room_id: &str, conn: ConnectionId, sender: PlayerSender) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn, sender);
        tracing::debug!(conn_id = %conn, room_id, "Subscribed to room");
    }

    /// Remove a connection from every room it listens to. Rooms left without
    /// subscribers are dropped.
    pub fn unsubscribe(&mut self, conn: ConnectionId) {
        self.rooms.retain(|_, subscribers| {
            subscribers.remove(&conn);
            !subscribers.is_empty()
        });
    }

    /// Broadcast raw binary data to all connections in a room.
    /// Uses `Bytes` internally for zero-copy cloning across channels.
    pub fn broadcast_to_room(&self, room_id: &str, data: &[u8]) {
        if let Some(subscribers) = self.rooms.get(room_id) {
            let bytes = Bytes::copy_from_slice(data);
            for (conn, sender) in subscribers {
                if let Err(e) = sender.try_send(bytes.clone()) {
                    tracing::debug!(
                        conn_id = %conn, room_id, error = %e,
                        "Skipping broadcast to slow client"
                    );
                }
            }
        }
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashMap::len)
    }

    /// Number of rooms with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
