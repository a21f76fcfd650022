//! Rooms known to the bridge: created ahead of time through `POST /rooms`,
//! or opened ad hoc by the first websocket that names them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_AGENT_TYPE: &str = "100x-prompt-sales";
/// A created room nobody joins is deleted after this long.
pub const EMPTY_TIMEOUT: Duration = Duration::from_secs(300);
/// The participant plus the agent.
pub const MAX_PARTICIPANTS: usize = 2;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub name: String,
    pub agent_type: String,
    pub empty_timeout_secs: u64,
    pub max_participants: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, PartialEq)]
pub enum RoomError {
    #[error("Invalid agent type '{0}'")]
    InvalidAgentType(String),
    #[error("Room '{0}' is full")]
    Full(String),
}

struct Entry {
    /// `None` for rooms opened by a connection without being created first.
    info: Option<RoomInfo>,
    participants: usize,
    empty_since: Instant,
}

#[derive(Clone)]
pub struct RoomDirectory {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    empty_timeout: Duration,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new(EMPTY_TIMEOUT)
    }
}

impl RoomDirectory {
    pub fn new(empty_timeout: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            empty_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a room with a generated name for `agent_type`.
    pub fn create(&self, agent_type: &str) -> Result<RoomInfo, RoomError> {
        let valid = !agent_type.is_empty()
            && agent_type.len() <= 64
            && agent_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RoomError::InvalidAgentType(agent_type.to_string()));
        }

        let info = RoomInfo {
            name: format!("voice-{agent_type}-{}", Uuid::new_v4().simple()),
            agent_type: agent_type.to_string(),
            empty_timeout_secs: self.empty_timeout.as_secs(),
            max_participants: MAX_PARTICIPANTS,
            created_at: Utc::now(),
        };
        self.lock().insert(
            info.name.clone(),
            Entry {
                info: Some(info.clone()),
                participants: 0,
                empty_since: Instant::now(),
            },
        );
        self.schedule_expiry(&info.name);
        info!(room = %info.name, agent_type = %info.agent_type, "Room created");
        Ok(info)
    }

    pub fn get(&self, name: &str) -> Option<RoomInfo> {
        self.lock().get(name).and_then(|entry| entry.info.clone())
    }

    /// Takes the participant seat of `name`, opening the room if it is unknown.
    pub fn join(&self, name: &str) -> Result<Participant, RoomError> {
        let mut entries = self.lock();
        let entry = entries.entry(name.to_string()).or_insert_with(|| Entry {
            info: None,
            participants: 0,
            empty_since: Instant::now(),
        });
        // One seat is always held by the agent.
        if entry.participants + 1 >= MAX_PARTICIPANTS {
            return Err(RoomError::Full(name.to_string()));
        }
        entry.participants += 1;
        Ok(Participant {
            rooms: self.clone(),
            name: name.to_string(),
        })
    }

    fn leave(&self, name: &str) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(name) else {
            return;
        };
        entry.participants = entry.participants.saturating_sub(1);
        if entry.participants > 0 {
            return;
        }
        let ad_hoc = entry.info.is_none();
        entry.empty_since = Instant::now();
        if ad_hoc {
            entries.remove(name);
            return;
        }
        drop(entries);
        self.schedule_expiry(name);
    }

    fn schedule_expiry(&self, name: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let rooms = self.clone();
        let name = name.to_string();
        runtime.spawn(async move {
            tokio::time::sleep(rooms.empty_timeout).await;
            let mut entries = rooms.lock();
            let expired = entries.get(&name).is_some_and(|entry| {
                entry.participants == 0 && entry.empty_since.elapsed() >= rooms.empty_timeout
            });
            if expired {
                entries.remove(&name);
                info!(room = %name, "Empty room deleted");
            }
        });
    }
}

/// A seat in a room, given back when dropped.
pub struct Participant {
    rooms: RoomDirectory,
    name: String,
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.rooms.leave(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_room_carries_metadata() {
        let rooms = RoomDirectory::default();
        let info = rooms.create(DEFAULT_AGENT_TYPE).unwrap();
        assert!(info.name.starts_with("voice-100x-prompt-sales-"));
        assert_eq!(info.agent_type, DEFAULT_AGENT_TYPE);
        assert_eq!(info.empty_timeout_secs, 300);
        assert_eq!(info.max_participants, 2);
        assert_eq!(rooms.get(&info.name), Some(info.clone()));

        let other = rooms.create(DEFAULT_AGENT_TYPE).unwrap();
        assert_ne!(other.name, info.name);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_agent_types() {
        let rooms = RoomDirectory::default();
        assert_eq!(
            rooms.create("../admin").err(),
            Some(RoomError::InvalidAgentType("../admin".into()))
        );
        assert!(rooms.create("").is_err());
    }

    #[tokio::test]
    async fn test_single_participant_seat() {
        let rooms = RoomDirectory::default();
        let info = rooms.create("support").unwrap();

        let seat = rooms.join(&info.name).unwrap();
        assert_eq!(
            rooms.join(&info.name).err(),
            Some(RoomError::Full(info.name.clone()))
        );
        drop(seat);
        assert!(rooms.join(&info.name).is_ok());
    }

    #[tokio::test]
    async fn test_ad_hoc_room_is_forgotten_when_left() {
        let rooms = RoomDirectory::default();
        let seat = rooms.join("room-42").unwrap();
        assert_eq!(rooms.get("room-42"), None);
        assert!(rooms.join("room-42").is_err());
        drop(seat);
        assert!(rooms.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_room_expires() {
        let rooms = RoomDirectory::new(Duration::from_millis(30));
        let idle = rooms.create("support").unwrap();
        let busy = rooms.create("support").unwrap();
        let _seat = rooms.join(&busy.name).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rooms.get(&idle.name), None);
        assert!(rooms.get(&busy.name).is_some());
    }
}
