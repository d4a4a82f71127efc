pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod room_hub;
pub mod router;
pub mod session;
pub mod state;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let cors = cors_layer(&config.cors_origin);
    let state = AppState::new(config);

    // Admin routes sit behind the bearer token when one is configured.
    let admin_routes = Router::new()
        .route("/stats", get(api::get_stats))
        .route(
            "/players/{player_id}/disconnect",
            post(api::disconnect_player),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_token,
        ));

    let api_routes = Router::new()
        .route("/scores/{room_id}", get(api::get_scores))
        .merge(admin_routes);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .with_state(state.clone());

    (app, state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Invalid CORS origin, allowing any");
            layer.allow_origin(Any)
        },
    }
}
