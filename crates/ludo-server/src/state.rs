use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use ludo_core::scoring::ScoringEngine;

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::room_hub::RoomHub;
use crate::session::SessionRegistry;

pub type SharedSessionRegistry = Arc<RwLock<SessionRegistry>>;
pub type SharedRoomHub = Arc<RwLock<RoomHub>>;

#[derive(Clone)]
pub struct AppState {
    pub scoring: Arc<ScoringEngine>,
    pub sessions: SharedSessionRegistry,
    pub hub: SharedRoomHub,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let auth = AuthConfig {
            bearer_token: config.auth.bearer_token.clone(),
        };
        Self {
            scoring: Arc::new(ScoringEngine::new(config.scoring.combo_window())),
            sessions: Arc::new(RwLock::new(SessionRegistry::new())),
            hub: Arc::new(RwLock::new(RoomHub::new())),
            auth,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a live WebSocket connection for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
