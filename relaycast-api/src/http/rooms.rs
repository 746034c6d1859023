// Room lifecycle and observability HTTP handlers
//
// Thin transport layer: the registry owns all room/peer state, handlers
// only validate input and map errors onto HTTP statuses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use relaycast_core::models::{Role, RoomId};
use relaycast_core::registry::{RoomSnapshot, ServerStats};
use relaycast_core::Error;

use super::{AppResult, AppState};

/// Longest accepted `post_id` / `host_user_id`, in bytes.
const MAX_FIELD_LEN: usize = 256;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub host_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub websocket_url: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopRoomResponse {
    pub status: &'static str,
    pub room_id: RoomId,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

fn required_field(value: Option<String>, name: &str) -> Result<String, Error> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("Missing {name}")))?;
    if value.len() > MAX_FIELD_LEN {
        return Err(Error::Validation(format!("{name} too long")));
    }
    Ok(value)
}

/// Create a new room
#[tracing::instrument(name = "http_create_room", skip(state, req))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<(StatusCode, Json<CreateRoomResponse>)> {
    let post_id = required_field(req.post_id, "post_id")?;
    let host_user_id = required_field(req.host_user_id, "host_user_id")?;

    let room_id = state.registry.create_room(post_id, host_user_id).await?;
    let websocket_url = state.config.websocket_url(&room_id, Role::Host);

    tracing::info!(room_id = %room_id, "Room created via control plane");
    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id,
            websocket_url,
            status: "created",
        }),
    ))
}

/// Stop a room, disconnecting every peer
#[tracing::instrument(name = "http_stop_room", skip(state))]
pub async fn stop_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<StopRoomResponse>> {
    let room_id = RoomId::from_string(room_id);
    state.registry.stop_room(&room_id)?;

    tracing::info!(room_id = %room_id, "Room stopped via control plane");
    Ok(Json(StopRoomResponse {
        status: "stopped",
        room_id,
    }))
}

/// Statistics for a single room
pub async fn room_stats(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomSnapshot>> {
    let room_id = RoomId::from_string(room_id);
    let snapshot = state.registry.room_stats(&room_id)?;
    Ok(Json(snapshot))
}

/// Aggregate server statistics
pub async fn server_stats(State(state): State<AppState>) -> Json<ServerStats> {
    Json(state.registry.server_stats())
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "relaycast",
    })
}
