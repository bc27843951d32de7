use std::sync::Arc;

use marbleparty::config::Config;
use marbleparty::room::{start_sweep_task, InMemoryRoomStore, RoomStore};
use marbleparty::shared::AppState;
use marbleparty::websockets::{NoMapBlueprints, SessionHub};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marbleparty=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(?config, "Starting marble party server");

    // Shared application state with dependency injection
    let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new(
        config.room_ttl,
        config.participant_ttl,
    ));
    let hub = Arc::new(SessionHub::new(store.clone(), Arc::new(NoMapBlueprints)));
    let app_state = AppState::new(store.clone(), hub);

    tokio::spawn(start_sweep_task(store, config.sweep_interval));

    let app = marbleparty::app_router(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .unwrap();
    info!("Server running on http://localhost:{}", config.port);
    axum::serve(listener, app).await.unwrap();
}
