use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{events, health, mode, replay, templates, windows};
use super::state::AppState;
use super::websocket::ws_handler;

const ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:1420",
    "http://localhost:5173",
    "http://127.0.0.1:1420",
    "http://127.0.0.1:5173",
];

pub fn create_router(state: Arc<AppState>) -> Router {
    // Restrict CORS to localhost only, the service is for the local operator
    let cors = CorsLayer::new()
        .allow_origin(
            ALLOWED_ORIGINS
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Event log
        .route(
            "/events",
            get(events::list_events)
                .put(events::replace_events)
                .delete(events::clear_events),
        )
        .route("/events/popup", post(events::add_popup))
        .route(
            "/events/:uid",
            post(events::edit_event).delete(events::delete_event),
        )
        // Mode
        .route("/mode", get(mode::get_mode).post(mode::set_mode))
        // Browsing contexts
        .route("/windows", post(windows::open_window))
        // Replay
        .route("/replay", post(replay::start_replay))
        .route("/replay/status", get(replay::get_replay_status))
        // Template data
        .route(
            "/templates",
            get(templates::get_templates).post(templates::set_templates),
        )
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
