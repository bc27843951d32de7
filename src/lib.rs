pub mod config;
pub mod room;
pub mod shared;
pub mod websockets;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use shared::AppState;

/// Builds the full HTTP and WebSocket router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(room::health))
        .route("/api/rooms", post(room::create_room))
        .route("/api/rooms/join", post(room::join_room))
        .route(
            "/api/rooms/:room_id",
            get(room::room_status).delete(room::close_room),
        )
        .route(
            "/api/rooms/:room_id/participants/:participant_id/ready",
            post(room::ready_participant),
        )
        .route("/api/rooms/:room_id/leave", post(room::leave_room))
        .route("/ws", get(websockets::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
