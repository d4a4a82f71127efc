/// Room, player and pawn identifiers are opaque strings chosen by clients.
pub type RoomId = String;
pub type PlayerId = String;
pub type PawnId = String;

/// Maximum length of a room, player or pawn identifier.
pub const MAX_ID_LEN: usize = 50;

/// Maximum length of a player display name.
pub const MAX_PLAYER_NAME_LEN: usize = 100;

/// Maximum number of pawns a player may declare on join.
pub const MAX_PAWNS_PER_PLAYER: usize = 4;

/// Check whether a string is a well-formed room id: 1..=50 characters from
/// `[A-Za-z0-9_-]`.
pub fn is_valid_room_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
