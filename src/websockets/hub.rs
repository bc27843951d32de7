use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::room::models::Participant;
use crate::room::store::RoomStore;

use super::messages::{ClientRole, ServerMessage, SlotAssignment};

/// Fixed marble color palette, cycled when a room has more participants
/// than colors.
pub const MARBLE_PALETTE: [&str; 8] = [
    "#E74C3C", "#3498DB", "#2ECC71", "#F1C40F", "#9B59B6", "#E67E22", "#1ABC9C", "#34495E",
];

const DEFAULT_OBSTACLE_ACTION: &str = "tap";

/// Collaborator supplying opaque map blueprints for `start_game`. The hub
/// passes the payload through unexamined.
#[async_trait]
pub trait MapBlueprints: Send + Sync {
    async fn blueprint(&self, map_id: &str) -> Option<serde_json::Value>;
}

/// Used when no map storage is wired in; every lookup misses.
pub struct NoMapBlueprints;

#[async_trait]
impl MapBlueprints for NoMapBlueprints {
    async fn blueprint(&self, _map_id: &str) -> Option<serde_json::Value> {
        None
    }
}

/// What a live socket is bound to after a successful `join` handshake.
/// Multiple host sockets per room are permitted.
#[derive(Debug, Clone)]
pub struct Binding {
    pub room_id: String,
    pub role: ClientRole,
    pub participant_id: Option<String>,
}

#[derive(Default)]
struct HubInner {
    next_connection_id: u64,
    /// room_id -> connection_id -> outbound sender
    rooms: HashMap<String, HashMap<u64, mpsc::UnboundedSender<String>>>,
    /// room_id -> participant_id -> current round slot
    assignments: HashMap<String, HashMap<String, SlotAssignment>>,
}

/// Binds live WebSocket connections to rooms, authenticates them against
/// the store, and fans out state-changing events to every socket in a
/// room. All hub state is ephemeral; nothing here survives a restart.
pub struct SessionHub {
    store: Arc<dyn RoomStore>,
    maps: Arc<dyn MapBlueprints>,
    inner: RwLock<HubInner>,
}

impl SessionHub {
    pub fn new(store: Arc<dyn RoomStore>, maps: Arc<dyn MapBlueprints>) -> Self {
        Self {
            store,
            maps,
            inner: RwLock::new(HubInner::default()),
        }
    }

    pub async fn next_connection_id(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.next_connection_id += 1;
        inner.next_connection_id
    }

    /// Validates a `join` handshake and registers the connection in the
    /// room's broadcast set. Returns `None` on any failure; the caller
    /// sends no error frame, so unauthenticated probes learn nothing.
    #[instrument(skip(self, sender, token))]
    pub async fn handle_join(
        &self,
        connection_id: u64,
        sender: mpsc::UnboundedSender<String>,
        room_id: &str,
        role: ClientRole,
        token: &str,
    ) -> Option<Binding> {
        let binding = match role {
            ClientRole::Host => {
                if !self.store.validate_host(room_id, token).await {
                    debug!(room_id = %room_id, "Rejected host join");
                    return None;
                }
                Binding {
                    room_id: room_id.to_string(),
                    role,
                    participant_id: None,
                }
            }
            ClientRole::Participant => {
                let participant = self.store.get_participant_by_token(room_id, token).await?;
                // A live socket counts as a heartbeat
                self.store.touch_participant(room_id, token).await;
                Binding {
                    room_id: room_id.to_string(),
                    role,
                    participant_id: Some(participant.participant_id),
                }
            }
        };

        {
            let mut inner = self.inner.write().await;
            inner
                .rooms
                .entry(room_id.to_string())
                .or_default()
                .insert(connection_id, sender);
        }
        info!(room_id = %room_id, connection_id, role = ?role, "Connection bound");

        // New and existing members converge on one consistent count
        self.broadcast_room_state(room_id).await;
        Some(binding)
    }

    /// Host-only: flips the room to playing, computes the round assignment
    /// from the current join-ordered participant list and broadcasts
    /// `game_started` to the whole room.
    #[instrument(skip(self, candidates))]
    pub async fn handle_start_game(
        &self,
        binding: &Binding,
        candidates: Vec<String>,
        map_id: Option<String>,
    ) {
        if binding.role != ClientRole::Host {
            debug!(room_id = %binding.room_id, "Ignoring start_game from non-host");
            return;
        }
        if !self.store.mark_playing(&binding.room_id).await {
            debug!(room_id = %binding.room_id, "Ignoring start_game for missing room");
            return;
        }

        let participants = self.store.list_participants(&binding.room_id).await;
        let assignments = compute_assignments(&participants);
        {
            let mut inner = self.inner.write().await;
            inner
                .assignments
                .insert(binding.room_id.clone(), assignments.clone());
        }

        let map = match &map_id {
            Some(id) => self.maps.blueprint(id).await,
            None => None,
        };

        info!(
            room_id = %binding.room_id,
            participants = participants.len(),
            "Round started"
        );
        self.broadcast(
            &binding.room_id,
            &ServerMessage::GameStarted {
                room_id: binding.room_id.clone(),
                candidates,
                assignments,
                map,
            },
        )
        .await;
    }

    /// Participant-only: rebroadcasts a tap as an `obstacle_action` event
    /// carrying the participant's obstacle id. Dropped silently when the
    /// participant holds no assignment (no round running, or they joined
    /// after the round started).
    #[instrument(skip(self))]
    pub async fn handle_obstacle_action(&self, binding: &Binding, action: Option<String>) {
        let Some(participant_id) = binding.participant_id.as_deref() else {
            debug!(room_id = %binding.room_id, "Ignoring obstacle_action from host socket");
            return;
        };

        let assignment = {
            let inner = self.inner.read().await;
            inner
                .assignments
                .get(&binding.room_id)
                .and_then(|slots| slots.get(participant_id))
                .cloned()
        };
        let Some(assignment) = assignment else {
            debug!(
                room_id = %binding.room_id,
                participant_id = %participant_id,
                "Ignoring obstacle_action without assignment"
            );
            return;
        };

        self.broadcast(
            &binding.room_id,
            &ServerMessage::ObstacleAction {
                room_id: binding.room_id.clone(),
                participant_id: participant_id.to_string(),
                obstacle_id: assignment.obstacle_id,
                action: action.unwrap_or_else(|| DEFAULT_OBSTACLE_ACTION.to_string()),
            },
        )
        .await;
    }

    /// Connection bookkeeping only: the participant entity stays in the
    /// store, so a brief disconnect does not evict a player from the
    /// round. The cached assignment goes once the room has no sockets.
    #[instrument(skip(self))]
    pub async fn handle_disconnect(&self, connection_id: u64, binding: Option<&Binding>) {
        let Some(binding) = binding else {
            return;
        };
        let mut inner = self.inner.write().await;
        if let Some(connections) = inner.rooms.get_mut(&binding.room_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                inner.rooms.remove(&binding.room_id);
                inner.assignments.remove(&binding.room_id);
                debug!(room_id = %binding.room_id, "Last socket gone, room broadcast set discarded");
            }
        }
    }

    /// Pushes current participant/ready counts to every socket in the
    /// room. Also invoked by the REST handlers after membership changes.
    #[instrument(skip(self))]
    pub async fn broadcast_room_state(&self, room_id: &str) {
        let stats = self.store.room_stats(room_id).await;
        self.broadcast(
            room_id,
            &ServerMessage::RoomState {
                participant_count: stats.participant_count,
                ready_count: stats.ready_count,
            },
        )
        .await;
    }

    /// Best-effort fan-out: no acknowledgment, no retry. A send only fails
    /// when the connection task is already gone, which disconnect
    /// bookkeeping will catch up with.
    async fn broadcast(&self, room_id: &str, message: &ServerMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(room_id = %room_id, %error, "Failed to serialize broadcast");
                return;
            }
        };

        let inner = self.inner.read().await;
        let Some(connections) = inner.rooms.get(room_id) else {
            return;
        };
        for sender in connections.values() {
            let _ = sender.send(payload.clone());
        }
    }
}

/// Derives the per-round slot mapping: join order gives the obstacle
/// ordinal, the palette is cycled modulo its length, and empty display
/// names fall back to "Player N".
pub fn compute_assignments(participants: &[Participant]) -> HashMap<String, SlotAssignment> {
    participants
        .iter()
        .enumerate()
        .map(|(index, participant)| {
            let nickname = if participant.display_name.is_empty() {
                format!("Player {}", index + 1)
            } else {
                participant.display_name.clone()
            };
            (
                participant.participant_id.clone(),
                SlotAssignment {
                    obstacle_id: index,
                    color: MARBLE_PALETTE[index % MARBLE_PALETTE.len()].to_string(),
                    nickname,
                },
            )
        })
        .collect()
}
