use std::time::SystemTime;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use ludo_core::room::PlayerId;

use crate::error::AppError;
use crate::state::AppState;

/// Authentication configuration for the HTTP admin surface.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for REST API access. None = auth disabled.
    pub bearer_token: Option<String>,
}

/// Identity claimed by a client when opening the WebSocket, passed as
/// `?playerId=…&playerName=…` on the upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub player_id: Option<String>,
    pub player_name: Option<String>,
}

/// An authenticated connection identity. Values are trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub player_name: String,
    pub authenticated_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingCredentials,
    InvalidPlayerId,
    InvalidPlayerName,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "Authentication failed: missing credentials"),
            Self::InvalidPlayerId => write!(f, "Authentication failed: invalid player ID"),
            Self::InvalidPlayerName => write!(f, "Authentication failed: invalid player name"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Check a handshake before the WebSocket upgrade completes.
pub fn authenticate(handshake: &Handshake) -> Result<Identity, AuthError> {
    let (Some(player_id), Some(player_name)) = (&handshake.player_id, &handshake.player_name)
    else {
        return Err(AuthError::MissingCredentials);
    };
    if player_id.is_empty() || player_name.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let player_id = player_id.trim();
    if player_id.is_empty() {
        return Err(AuthError::InvalidPlayerId);
    }
    let player_name = player_name.trim();
    if player_name.is_empty() {
        return Err(AuthError::InvalidPlayerName);
    }

    Ok(Identity {
        player_id: player_id.to_string(),
        player_name: player_name.to_string(),
        authenticated_at: SystemTime::now(),
    })
}

impl AuthConfig {
    /// Whether a request carrying `headers` may use the admin routes. With
    /// no token configured every request is admitted.
    pub fn admits(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.bearer_token.as_deref() else {
            return true;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

/// Gate for the admin API. Rejections use the JSON error body of the rest
/// of the API.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth.admits(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Admin request without valid token");
        return Err(AppError::Unauthorized("Missing or invalid bearer token".to_string()));
    }
    Ok(next.run(request).await)
}
