use chrono::{DateTime, TimeDelta, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Length of the generated host and participant secrets
const SECRET_LENGTH: usize = 24;

/// Room lifecycle status. The transition is one-way: a room starts
/// `Waiting` and only an authenticated host moves it to `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

/// One joined player device, owned by its room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub room_id: String,
    pub display_name: String,
    /// Opaque bearer secret; the only credential a participant holds
    pub display_token: String,
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(room_id: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            participant_id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            display_name: display_name.to_string(),
            display_token: generate_secret(),
            is_ready: false,
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Advances `last_seen_at`. Never moves it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_seen_at {
            self.last_seen_at = now;
        }
    }
}

/// One live race session. Owns its participants directly, so closing or
/// expiring the room removes them in the same operation.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    /// 4-digit human-entered code, unique among live rooms only
    pub room_code: String,
    /// Opaque secret granting host-level control
    pub host_key: String,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Join-ordered participant list
    participants: Vec<Participant>,
    /// display_token -> participant_id
    token_index: HashMap<String, String>,
}

impl Room {
    pub fn new(room_code: String, ttl: TimeDelta) -> Self {
        let created_at = Utc::now();
        Self {
            room_id: Uuid::new_v4().to_string(),
            room_code,
            host_key: generate_secret(),
            status: RoomStatus::Waiting,
            created_at,
            expires_at: created_at + ttl,
            participants: Vec::new(),
            token_index: HashMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Appends a participant, keeping the list and the token index in step.
    pub fn add_participant(&mut self, display_name: &str) -> Participant {
        let participant = Participant::new(&self.room_id, display_name);
        self.token_index.insert(
            participant.display_token.clone(),
            participant.participant_id.clone(),
        );
        self.participants.push(participant.clone());
        participant
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn participant_by_token(&self, token: &str) -> Option<&Participant> {
        let participant_id = self.token_index.get(token)?;
        self.participant(participant_id)
    }

    pub fn participant_by_token_mut(&mut self, token: &str) -> Option<&mut Participant> {
        let participant_id = self.token_index.get(token)?.clone();
        self.participant_mut(&participant_id)
    }

    /// Removes a participant from both the list and the token index.
    pub fn remove_participant(&mut self, participant_id: &str) -> bool {
        let Some(position) = self
            .participants
            .iter()
            .position(|p| p.participant_id == participant_id)
        else {
            return false;
        };
        let participant = self.participants.remove(position);
        self.token_index.remove(&participant.display_token);
        true
    }

    /// Drops every participant whose heartbeat is older than `ttl`.
    /// Returns how many were removed.
    pub fn expire_participants(&mut self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let before = self.participants.len();
        let token_index = &mut self.token_index;
        self.participants.retain(|p| {
            let expired = now.signed_duration_since(p.last_seen_at) > ttl;
            if expired {
                token_index.remove(&p.display_token);
            }
            !expired
        });
        before - self.participants.len()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            participant_count: self.participants.len(),
            ready_count: self.participants.iter().filter(|p| p.is_ready).count(),
        }
    }
}

/// Live per-room counts, recomputed on demand from the membership list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub participant_count: usize,
    pub ready_count: usize,
}

fn generate_secret() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup_participant() {
        let mut room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let p = room.add_participant("Kim");

        assert_eq!(room.participant(&p.participant_id).unwrap().display_name, "Kim");
        assert_eq!(
            room.participant_by_token(&p.display_token)
                .unwrap()
                .participant_id,
            p.participant_id
        );
        assert!(!p.is_ready);
    }

    #[test]
    fn test_remove_participant_clears_token_index() {
        let mut room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let p = room.add_participant("Kim");

        assert!(room.remove_participant(&p.participant_id));
        assert!(room.participant(&p.participant_id).is_none());
        assert!(room.participant_by_token(&p.display_token).is_none());
        // Second removal is a no-op
        assert!(!room.remove_participant(&p.participant_id));
    }

    #[test]
    fn test_participants_keep_join_order() {
        let mut room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let p1 = room.add_participant("Kim");
        let p2 = room.add_participant("Lee");
        let p3 = room.add_participant("Park");

        let ids: Vec<_> = room
            .participants()
            .iter()
            .map(|p| p.participant_id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![p1.participant_id, p2.participant_id, p3.participant_id]
        );
    }

    #[test]
    fn test_touch_never_decreases_last_seen() {
        let mut participant = Participant::new("room", "Kim");
        let future = Utc::now() + TimeDelta::hours(1);
        participant.last_seen_at = future;

        participant.touch();
        assert_eq!(participant.last_seen_at, future);
    }

    #[test]
    fn test_expire_participants_removes_only_stale() {
        let mut room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let stale = room.add_participant("Stale");
        let fresh = room.add_participant("Fresh");

        let past = Utc::now() - TimeDelta::minutes(5);
        room.participant_mut(&stale.participant_id)
            .unwrap()
            .last_seen_at = past;

        let removed = room.expire_participants(Utc::now(), TimeDelta::minutes(1));
        assert_eq!(removed, 1);
        assert!(room.participant(&stale.participant_id).is_none());
        assert!(room.participant_by_token(&stale.display_token).is_none());
        assert!(room.participant(&fresh.participant_id).is_some());
    }

    #[test]
    fn test_stats_counts_ready() {
        let mut room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let p1 = room.add_participant("Kim");
        room.add_participant("Lee");
        room.participant_mut(&p1.participant_id).unwrap().is_ready = true;

        let stats = room.stats();
        assert_eq!(stats.participant_count, 2);
        assert_eq!(stats.ready_count, 1);
    }

    #[test]
    fn test_secrets_are_distinct() {
        let room = Room::new("1234".to_string(), TimeDelta::hours(1));
        let other = Room::new("5678".to_string(), TimeDelta::hours(1));
        assert_eq!(room.host_key.len(), 24);
        assert_ne!(room.host_key, other.host_key);
    }
}
