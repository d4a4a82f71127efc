use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ludo_core::net::messages::{AuthDisconnectMsg, ServerMessage};
use ludo_core::net::protocol::encode_server_message;
use ludo_core::room::{PlayerId, RoomId};

use crate::auth::Identity;

/// Per-connection sender for outbound WebSocket binary messages.
/// Bounded so a slow client cannot exhaust memory; `Bytes` makes fan-out
/// to many connections a cheap clone.
pub type PlayerSender = mpsc::Sender<Bytes>;

/// Identifier of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handles the registry needs to reach or close a live connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub sender: PlayerSender,
    pub shutdown: CancellationToken,
}

/// The record binding one connection to a player identity and a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub player_id: PlayerId,
    pub player_name: String,
    pub room_id: RoomId,
    pub connected_at: SystemTime,
}

/// A connection tried to act on a room it is not registered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    NotRegistered,
    WrongRoom {
        room_id: RoomId,
    },
    AlreadyRegistered {
        registered: RoomId,
        requested: RoomId,
    },
}

impl std::fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "Connection has not joined a room"),
            Self::WrongRoom { room_id } => {
                write!(f, "Connection not authorized for room {room_id}")
            },
            Self::AlreadyRegistered {
                registered,
                requested,
            } => write!(
                f,
                "Connection already joined room {registered}, cannot join {requested}"
            ),
        }
    }
}

impl std::error::Error for AuthorizationError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    pub players: usize,
    pub connections: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub connections: usize,
    pub rooms: usize,
}

/// Observability snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_connections: usize,
    pub total_players: usize,
    pub room_stats: BTreeMap<RoomId, RoomStats>,
    pub player_stats: BTreeMap<PlayerId, PlayerStats>,
}

/// Tracks which connection belongs to which player and room.
#[derive(Default)]
pub struct SessionRegistry {
    /// Every live connection, registered to a room or not.
    handles: HashMap<ConnectionId, ConnectionHandle>,
    sessions: HashMap<ConnectionId, Session>,
    /// Reverse index: player id → their registered connections.
    player_connections: HashMap<PlayerId, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly authenticated connection so it can be reached by
    /// `disconnect_player` once it registers to a room.
    pub fn attach(&mut self, conn: ConnectionId, handle: ConnectionHandle) {
        self.handles.insert(conn, handle);
    }

    /// Bind a connection to a room. Re-registering the same room is a no-op;
    /// the room of a connection never changes once set.
    pub fn register(
        &mut self,
        conn: ConnectionId,
        identity: &Identity,
        room_id: &str,
    ) -> Result<(), AuthorizationError> {
        if let Some(existing) = self.sessions.get(&conn) {
            if existing.room_id == room_id {
                return Ok(());
            }
            return Err(AuthorizationError::AlreadyRegistered {
                registered: existing.room_id.clone(),
                requested: room_id.to_string(),
            });
        }

        self.sessions.insert(
            conn,
            Session {
                player_id: identity.player_id.clone(),
                player_name: identity.player_name.clone(),
                room_id: room_id.to_string(),
                connected_at: identity.authenticated_at,
            },
        );
        self.player_connections
            .entry(identity.player_id.clone())
            .or_default()
            .insert(conn);

        tracing::debug!(
            conn_id = %conn,
            player_id = %identity.player_id,
            room_id,
            "Connection registered"
        );
        Ok(())
    }

    /// Forget a connection entirely. Returns its session if it had joined a room.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<Session> {
        self.handles.remove(&conn);
        let session = self.sessions.remove(&conn)?;

        if let Some(set) = self.player_connections.get_mut(&session.player_id) {
            set.remove(&conn);
            if set.is_empty() {
                self.player_connections.remove(&session.player_id);
            }
        }

        tracing::debug!(
            conn_id = %conn,
            player_id = %session.player_id,
            room_id = %session.room_id,
            "Connection unregistered"
        );
        Some(session)
    }

    pub fn is_authorized_for_room(&self, conn: ConnectionId, room_id: &str) -> bool {
        self.sessions
            .get(&conn)
            .is_some_and(|s| s.room_id == room_id)
    }

    pub fn validate_room_access(
        &self,
        conn: ConnectionId,
        room_id: &str,
    ) -> Result<(), AuthorizationError> {
        let session = self
            .sessions
            .get(&conn)
            .ok_or(AuthorizationError::NotRegistered)?;
        if session.room_id != room_id {
            return Err(AuthorizationError::WrongRoom {
                room_id: room_id.to_string(),
            });
        }
        Ok(())
    }

    /// Notify and close every connection owned by a player. Returns how many
    /// connections were told to close.
    pub fn disconnect_player(&self, player_id: &str, reason: &str) -> usize {
        let Some(conns) = self.player_connections.get(player_id) else {
            return 0;
        };

        let notice = encode_server_message(&ServerMessage::AuthDisconnect(AuthDisconnectMsg {
            reason: reason.to_string(),
        }))
        .map(Bytes::from);

        let mut closed = 0;
        for conn in conns {
            let Some(handle) = self.handles.get(conn) else {
                continue;
            };
            if let Ok(ref frame) = notice
                && let Err(e) = handle.sender.try_send(frame.clone())
            {
                tracing::debug!(conn_id = %conn, error = %e, "Could not deliver disconnect notice");
            }
            handle.shutdown.cancel();
            closed += 1;
        }

        tracing::info!(player_id, reason, connections = closed, "Player disconnected");
        closed
    }

    pub fn session(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn player_connections(&self, player_id: &str) -> Vec<ConnectionId> {
        self.player_connections
            .get(player_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_connections(&self, room_id: &str) -> Vec<ConnectionId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.room_id == room_id)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn has_duplicate_connections(&self, player_id: &str) -> bool {
        self.player_connections
            .get(player_id)
            .is_some_and(|set| set.len() > 1)
    }

    /// Number of live connections, including ones that have not joined a room.
    pub fn connection_count(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> SessionStats {
        let mut room_players: BTreeMap<&str, (BTreeSet<&str>, usize)> = BTreeMap::new();
        let mut player_rooms: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();

        for session in self.sessions.values() {
            let room = room_players.entry(&session.room_id).or_default();
            room.0.insert(&session.player_id);
            room.1 += 1;

            let player = player_rooms.entry(&session.player_id).or_default();
            player.0 += 1;
            player.1.insert(&session.room_id);
        }

        SessionStats {
            total_connections: self.sessions.len(),
            total_players: self.player_connections.len(),
            room_stats: room_players
                .into_iter()
                .map(|(room, (players, connections))| {
                    (
                        room.to_string(),
                        RoomStats {
                            players: players.len(),
                            connections,
                        },
                    )
                })
                .collect(),
            player_stats: player_rooms
                .into_iter()
                .map(|(player, (connections, rooms))| {
                    (
                        player.to_string(),
                        PlayerStats {
                            connections,
                            rooms: rooms.len(),
                        },
                    )
                })
                .collect(),
        }
    }
}
