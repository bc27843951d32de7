use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a connection claims in its `join` handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Host,
    Participant,
}

/// Messages a client may send over the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authentication handshake; the only way out of the unbound state
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        role: ClientRole,
        token: String,
    },
    /// Host starts a round with an already-expanded candidate list
    #[serde(rename_all = "camelCase")]
    StartGame {
        candidates: Vec<String>,
        #[serde(default)]
        map_id: Option<String>,
    },
    /// Participant tap during a round
    ObstacleAction {
        #[serde(default)]
        action: Option<String>,
    },
}

/// Messages fanned out to every socket in a room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    RoomState {
        participant_count: usize,
        ready_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        room_id: String,
        candidates: Vec<String>,
        assignments: HashMap<String, SlotAssignment>,
        #[serde(skip_serializing_if = "Option::is_none")]
        map: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    ObstacleAction {
        room_id: String,
        participant_id: String,
        obstacle_id: usize,
        action: String,
    },
}

/// Per-round gameplay slot handed to one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    pub obstacle_id: usize,
    pub color: String,
    pub nickname: String,
}
