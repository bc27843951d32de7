use serde::{Deserialize, Serialize};

use super::models::RoomStatus;

/// Number of digits in a room code
pub const ROOM_CODE_LENGTH: usize = 4;
/// Longest display name kept after sanitization
pub const MAX_DISPLAY_NAME_LENGTH: usize = 12;

/// Request payload for joining a room by code
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_code: String,
    #[serde(default)]
    pub display_name: String,
}

/// Request payload for the ready toggle
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRequest {
    #[serde(default)]
    pub is_ready: bool,
}

/// Response for room creation; the host key is returned exactly once here
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub room_code: String,
    pub host_key: String,
    pub participant_count: usize,
    pub ready_count: usize,
}

/// Response for room status lookups
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusResponse {
    pub room_id: String,
    pub room_code: String,
    pub status: RoomStatus,
    pub participant_count: usize,
    pub ready_count: usize,
}

/// Response for joining a room
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room_id: String,
    pub room_code: String,
    pub participant_id: String,
    pub display_token: String,
}

/// Plain acknowledgment for ready/leave/close
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Keeps only digits and truncates to the code length.
pub fn normalize_room_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(ROOM_CODE_LENGTH)
        .collect()
}

pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

/// Trims, collapses internal whitespace and bounds the length.
pub fn sanitize_display_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_DISPLAY_NAME_LENGTH).collect()
}
