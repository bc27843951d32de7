use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::models::{Participant, Room, RoomStats, RoomStatus};
use super::types::ROOM_CODE_LENGTH;

/// How many random code draws to attempt before accepting a collision.
/// The code space (10^4) dwarfs realistic concurrent room counts, so
/// giving up on uniqueness after this many tries trades strictness for
/// bounded latency.
const CODE_DRAW_ATTEMPTS: usize = 10;

/// Result of attempting to close a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRoomResult {
    /// Room and all of its participants were removed
    Closed,
    /// Room does not exist or has expired
    NotFound,
    /// Host key did not match
    Unauthorized,
}

/// Trait for room and participant storage operations.
///
/// Expiry is enforced lazily on every read in addition to the periodic
/// sweep, so no caller ever observes a stale room.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_room(&self) -> Room;
    async fn get_room(&self, room_id: &str) -> Option<Room>;
    async fn get_room_by_code(&self, room_code: &str) -> Option<Room>;
    async fn validate_host(&self, room_id: &str, host_key: &str) -> bool;
    /// One-way status transition to `Playing`; returns false if the room
    /// is absent or expired.
    async fn mark_playing(&self, room_id: &str) -> bool;
    /// Removes the room and cascades to its participants atomically.
    async fn close_room(&self, room_id: &str, host_key: &str) -> CloseRoomResult;

    async fn add_participant(&self, room_id: &str, display_name: &str) -> Option<Participant>;
    async fn get_participant(&self, room_id: &str, participant_id: &str) -> Option<Participant>;
    /// A token resolves only when the supplied room matches, which blocks
    /// cross-room token replay.
    async fn get_participant_by_token(&self, room_id: &str, token: &str) -> Option<Participant>;
    async fn touch_participant(&self, room_id: &str, token: &str) -> Option<Participant>;
    async fn update_ready(
        &self,
        room_id: &str,
        participant_id: &str,
        is_ready: bool,
    ) -> Option<Participant>;
    async fn remove_participant(&self, room_id: &str, participant_id: &str) -> bool;
    /// Join-ordered snapshot of the room's participants
    async fn list_participants(&self, room_id: &str) -> Vec<Participant>;
    async fn room_stats(&self, room_id: &str) -> RoomStats;

    /// Batch expiry passes; each returns how many entities were removed.
    async fn sweep_expired_rooms(&self) -> usize;
    async fn cleanup_participants(&self) -> usize;
}

struct StoreInner {
    rooms: HashMap<String, Room>,
    room_id_by_code: HashMap<String, String>,
}

/// In-memory implementation backing a single-process deployment. Every
/// operation completes under one lock acquisition, so multi-step mutations
/// (insert plus index update, close plus cascade) are atomic.
pub struct InMemoryRoomStore {
    room_ttl: TimeDelta,
    participant_ttl: TimeDelta,
    inner: Mutex<StoreInner>,
}

impl InMemoryRoomStore {
    pub fn new(room_ttl: Duration, participant_ttl: Duration) -> Self {
        Self {
            room_ttl: to_delta(room_ttl),
            participant_ttl: to_delta(participant_ttl),
            inner: Mutex::new(StoreInner {
                rooms: HashMap::new(),
                room_id_by_code: HashMap::new(),
            }),
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::milliseconds(duration.as_millis() as i64)
}

fn random_room_code() -> String {
    let max = 10u32.pow(ROOM_CODE_LENGTH as u32);
    format!(
        "{:0width$}",
        rand::rng().random_range(0..max),
        width = ROOM_CODE_LENGTH
    )
}

impl StoreInner {
    /// Returns the room if it exists and is live; an expired room is
    /// deleted on the spot (lazy expiry).
    fn live_room(&mut self, room_id: &str) -> Option<&mut Room> {
        let expired = match self.rooms.get(room_id) {
            Some(room) => room.is_expired(Utc::now()),
            None => return None,
        };
        if expired {
            self.delete_room(room_id);
            return None;
        }
        self.rooms.get_mut(room_id)
    }

    fn delete_room(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.remove(room_id) {
            self.room_id_by_code.remove(&room.room_code);
        }
    }

    /// Draws random codes until one is free of live rooms, accepting the
    /// last draw once the attempt budget runs out.
    fn unique_room_code(&self) -> String {
        let mut code = random_room_code();
        for _ in 0..CODE_DRAW_ATTEMPTS {
            if !self.room_id_by_code.contains_key(&code) {
                return code;
            }
            code = random_room_code();
        }
        warn!(code = %code, "Room code draw budget exhausted, accepting collision");
        code
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    #[instrument(skip(self))]
    async fn create_room(&self) -> Room {
        let mut inner = self.inner.lock().unwrap();
        let code = inner.unique_room_code();
        let room = Room::new(code, self.room_ttl);
        inner
            .room_id_by_code
            .insert(room.room_code.clone(), room.room_id.clone());
        inner.rooms.insert(room.room_id.clone(), room.clone());

        info!(room_id = %room.room_id, room_code = %room.room_code, "Room created");
        room
    }

    #[instrument(skip(self))]
    async fn get_room(&self, room_id: &str) -> Option<Room> {
        let mut inner = self.inner.lock().unwrap();
        inner.live_room(room_id).map(|room| room.clone())
    }

    #[instrument(skip(self))]
    async fn get_room_by_code(&self, room_code: &str) -> Option<Room> {
        let mut inner = self.inner.lock().unwrap();
        let room_id = inner.room_id_by_code.get(room_code)?.clone();
        inner.live_room(&room_id).map(|room| room.clone())
    }

    #[instrument(skip(self, host_key))]
    async fn validate_host(&self, room_id: &str, host_key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.live_room(room_id) {
            Some(room) => room.host_key == host_key,
            None => false,
        }
    }

    #[instrument(skip(self))]
    async fn mark_playing(&self, room_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.live_room(room_id) {
            Some(room) => {
                room.status = RoomStatus::Playing;
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self, host_key))]
    async fn close_room(&self, room_id: &str, host_key: &str) -> CloseRoomResult {
        let mut inner = self.inner.lock().unwrap();
        let Some(room) = inner.live_room(room_id) else {
            debug!(room_id = %room_id, "Close requested for unknown room");
            return CloseRoomResult::NotFound;
        };
        if room.host_key != host_key {
            warn!(room_id = %room_id, "Close requested with wrong host key");
            return CloseRoomResult::Unauthorized;
        }
        // The room owns its participants, so this removes them with it.
        inner.delete_room(room_id);
        info!(room_id = %room_id, "Room closed by host");
        CloseRoomResult::Closed
    }

    #[instrument(skip(self))]
    async fn add_participant(&self, room_id: &str, display_name: &str) -> Option<Participant> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner.live_room(room_id)?;
        let participant = room.add_participant(display_name);
        info!(
            room_id = %room_id,
            participant_id = %participant.participant_id,
            "Participant joined"
        );
        Some(participant)
    }

    #[instrument(skip(self))]
    async fn get_participant(&self, room_id: &str, participant_id: &str) -> Option<Participant> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner.live_room(room_id)?;
        room.participant(participant_id).cloned()
    }

    #[instrument(skip(self, token))]
    async fn get_participant_by_token(&self, room_id: &str, token: &str) -> Option<Participant> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner.live_room(room_id)?;
        room.participant_by_token(token).cloned()
    }

    #[instrument(skip(self, token))]
    async fn touch_participant(&self, room_id: &str, token: &str) -> Option<Participant> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner.live_room(room_id)?;
        let participant = room.participant_by_token_mut(token)?;
        participant.touch();
        Some(participant.clone())
    }

    #[instrument(skip(self))]
    async fn update_ready(
        &self,
        room_id: &str,
        participant_id: &str,
        is_ready: bool,
    ) -> Option<Participant> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner.live_room(room_id)?;
        let participant = room.participant_mut(participant_id)?;
        participant.is_ready = is_ready;
        participant.touch();
        debug!(
            room_id = %room_id,
            participant_id = %participant_id,
            is_ready,
            "Ready state updated"
        );
        Some(participant.clone())
    }

    #[instrument(skip(self))]
    async fn remove_participant(&self, room_id: &str, participant_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(room) = inner.live_room(room_id) else {
            return false;
        };
        let removed = room.remove_participant(participant_id);
        if removed {
            info!(room_id = %room_id, participant_id = %participant_id, "Participant left");
        }
        removed
    }

    #[instrument(skip(self))]
    async fn list_participants(&self, room_id: &str) -> Vec<Participant> {
        let mut inner = self.inner.lock().unwrap();
        match inner.live_room(room_id) {
            Some(room) => room.participants().to_vec(),
            None => Vec::new(),
        }
    }

    #[instrument(skip(self))]
    async fn room_stats(&self, room_id: &str) -> RoomStats {
        let mut inner = self.inner.lock().unwrap();
        match inner.live_room(room_id) {
            Some(room) => room.stats(),
            None => RoomStats::default(),
        }
    }

    #[instrument(skip(self))]
    async fn sweep_expired_rooms(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let expired: Vec<String> = inner
            .rooms
            .values()
            .filter(|room| room.is_expired(now))
            .map(|room| room.room_id.clone())
            .collect();
        for room_id in &expired {
            inner.delete_room(room_id);
            debug!(room_id = %room_id, "Swept expired room");
        }
        expired.len()
    }

    #[instrument(skip(self))]
    async fn cleanup_participants(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let ttl = self.participant_ttl;
        inner
            .rooms
            .values_mut()
            .map(|room| room.expire_participants(now, ttl))
            .sum()
    }
}
