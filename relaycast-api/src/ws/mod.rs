//! WebSocket signaling endpoints
//!
//! `GET /room/{room_id}/{host|viewer}` upgrades into one signaling
//! session per peer. Capacity is enforced before the upgrade (503); an
//! invalid role segment or missing room closes the socket with 1008
//! after the upgrade so the client sees a close code instead of a bare
//! HTTP error.

pub mod session;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::atomic::Ordering;

use relaycast_core::models::{Role, RoomId};
use relaycast_core::signal::CLOSE_POLICY_VIOLATION;

use crate::http::{AppError, AppState};

/// Signaling frames stay small; capability blobs are the largest payload
/// by far and fit comfortably under this.
const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Query parameters for the signaling endpoints
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// Create the signaling router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/room/:room_id/:role", get(ws_handler))
        .with_state(state)
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path((room_id, role)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.connections.load(Ordering::Relaxed) >= state.config.server.max_connections {
        return AppError::service_unavailable("connection limit reached").into_response();
    }

    let room_id = RoomId::from_string(room_id);
    let role = role.parse::<Role>();

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            match role {
                Ok(role) => session::run(state, socket, room_id, role, query).await,
                Err(reason) => {
                    session::close_early(socket, CLOSE_POLICY_VIOLATION, &reason).await;
                }
            }
        })
}
