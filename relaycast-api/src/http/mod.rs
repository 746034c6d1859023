// Module: http
// HTTP/JSON control plane for room lifecycle and observability

pub mod error;
pub mod rooms;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use relaycast_core::fanout::FanoutCoordinator;
use relaycast_core::registry::Registry;
use relaycast_core::Config;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub fanout: Arc<FanoutCoordinator>,
    /// Open WebSocket sessions, checked against `max_connections`.
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        registry: Arc<Registry>,
        fanout: Arc<FanoutCoordinator>,
    ) -> Self {
        Self {
            config,
            registry,
            fanout,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Create the control-plane router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/room/create", post(rooms::create_room))
        .route("/room/:room_id/stop", post(rooms::stop_room))
        .route("/room/:room_id/stats", get(rooms::room_stats))
        .route("/stats", get(rooms::server_stats))
        .route("/health", get(rooms::health))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        // Guards against slow clients holding request handlers open.
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
