use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{info, instrument, warn};

use crate::shared::{AppError, AppState};

use super::store::CloseRoomResult;
use super::types::{
    is_valid_room_code, normalize_room_code, sanitize_display_name, CreateRoomResponse,
    JoinRoomRequest, JoinRoomResponse, OkResponse, ReadyRequest, RoomStatusResponse,
};

/// HTTP handler for creating a new room
///
/// POST /api/rooms
/// The host key is returned here and never again.
#[instrument(name = "create_room", skip(state))]
pub async fn create_room(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateRoomResponse>) {
    let room = state.store.create_room().await;
    let stats = state.store.room_stats(&room.room_id).await;

    info!(room_id = %room.room_id, room_code = %room.room_code, "Room created");

    (
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id: room.room_id,
            room_code: room.room_code,
            host_key: room.host_key,
            participant_count: stats.participant_count,
            ready_count: stats.ready_count,
        }),
    )
}

/// HTTP handler for room status lookups
///
/// GET /api/rooms/:room_id
#[instrument(name = "room_status", skip(state))]
pub async fn room_status(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatusResponse>, AppError> {
    let room = state
        .store
        .get_room(&room_id)
        .await
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))?;
    let stats = state.store.room_stats(&room_id).await;

    Ok(Json(RoomStatusResponse {
        room_id: room.room_id,
        room_code: room.room_code,
        status: room.status,
        participant_count: stats.participant_count,
        ready_count: stats.ready_count,
    }))
}

/// HTTP handler for joining a room by its 4-digit code
///
/// POST /api/rooms/join
#[instrument(name = "join_room", skip(state, request))]
pub async fn join_room(
    State(state): State<AppState>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, AppError> {
    let room_code = normalize_room_code(&request.room_code);
    if !is_valid_room_code(&room_code) {
        return Err(AppError::InvalidInput("Invalid room code".to_string()));
    }

    let room = state
        .store
        .get_room_by_code(&room_code)
        .await
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))?;

    let display_name = sanitize_display_name(&request.display_name);
    let participant = state
        .store
        .add_participant(&room.room_id, &display_name)
        .await
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))?;

    info!(
        room_id = %room.room_id,
        participant_id = %participant.participant_id,
        "Participant joined via room code"
    );
    state.hub.broadcast_room_state(&room.room_id).await;

    Ok(Json(JoinRoomResponse {
        room_id: room.room_id,
        room_code: room.room_code,
        participant_id: participant.participant_id,
        display_token: participant.display_token,
    }))
}

/// HTTP handler for the ready toggle. The bearer token must belong to the
/// addressed participant.
///
/// POST /api/rooms/:room_id/participants/:participant_id/ready
#[instrument(name = "ready_participant", skip(state, headers, request))]
pub async fn ready_participant(
    State(state): State<AppState>,
    Path((room_id, participant_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<ReadyRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    // Any authenticated call counts as a heartbeat
    state.store.touch_participant(&room_id, token).await;

    let participant = state
        .store
        .get_participant(&room_id, &participant_id)
        .await
        .filter(|p| p.display_token == token)
        .ok_or_else(|| {
            warn!(room_id = %room_id, participant_id = %participant_id, "Rejected ready toggle");
            AppError::Unauthorized("Unauthorized".to_string())
        })?;

    state
        .store
        .update_ready(&room_id, &participant.participant_id, request.is_ready)
        .await;
    state.hub.broadcast_room_state(&room_id).await;

    Ok(Json(OkResponse::ok()))
}

/// HTTP handler for leaving a room (bearer auth)
///
/// POST /api/rooms/:room_id/leave
#[instrument(name = "leave_room", skip(state, headers))]
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    state.store.touch_participant(&room_id, token).await;

    let participant = state
        .store
        .get_participant_by_token(&room_id, token)
        .await
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    state
        .store
        .remove_participant(&room_id, &participant.participant_id)
        .await;
    state.hub.broadcast_room_state(&room_id).await;

    Ok(Json(OkResponse::ok()))
}

/// HTTP handler for closing a room (X-Host-Key auth). Participants are
/// removed together with the room.
///
/// DELETE /api/rooms/:room_id
#[instrument(name = "close_room", skip(state, headers))]
pub async fn close_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, AppError> {
    let host_key = headers
        .get("x-host-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing host key".to_string()))?;

    match state.store.close_room(&room_id, host_key).await {
        CloseRoomResult::Closed => {
            state.hub.broadcast_room_state(&room_id).await;
            Ok(Json(OkResponse::ok()))
        }
        CloseRoomResult::Unauthorized => {
            Err(AppError::Unauthorized("Unauthorized".to_string()))
        }
        CloseRoomResult::NotFound => Err(AppError::NotFound("Room not found".to_string())),
    }
}

/// Health probe
///
/// GET /health
pub async fn health() -> Json<OkResponse> {
    Json(OkResponse::ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
