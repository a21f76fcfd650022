//! Per-session call records kept by the worker.
//!
//! A record is opened when a job is accepted and closed when its task ends,
//! even if the entrypoint panicked.

use agent_core::session::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch;

/// Finished calls kept for inspection; the oldest are dropped first.
const CALL_HISTORY: usize = 256;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Connecting,
    Active,
    Ended,
    Failed,
}

impl From<SessionState> for CallStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle | SessionState::Connecting | SessionState::Assembling => {
                CallStatus::Connecting
            }
            SessionState::Active => CallStatus::Active,
            SessionState::Closed => CallStatus::Ended,
            SessionState::Failed => CallStatus::Failed,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub job_id: String,
    pub room: String,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

struct LiveCall {
    job_id: String,
    started_at: DateTime<Utc>,
    state: Arc<watch::Sender<SessionState>>,
}

impl LiveCall {
    fn snapshot(&self, room: &str) -> CallRecord {
        CallRecord {
            job_id: self.job_id.clone(),
            room: room.to_string(),
            status: (*self.state.borrow()).into(),
            started_at: self.started_at,
            ended_at: None,
            duration_ms: None,
        }
    }
}

#[derive(Default)]
struct Registry {
    live: HashMap<String, LiveCall>,
    finished: VecDeque<CallRecord>,
}

/// Live sessions keyed by room, plus the history of finished calls.
#[derive(Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<Registry>>,
}

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a call for `room`. Returns `None` if the room already has one.
    pub(crate) fn open(
        &self,
        job_id: &str,
        room: &str,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Option<CallGuard> {
        let mut registry = self.lock();
        if registry.live.contains_key(room) {
            return None;
        }
        registry.live.insert(
            room.to_string(),
            LiveCall {
                job_id: job_id.to_string(),
                started_at: Utc::now(),
                state: state.clone(),
            },
        );
        Some(CallGuard {
            log: self.clone(),
            room: room.to_string(),
            state,
        })
    }

    fn finish(&self, room: &str) {
        let mut registry = self.lock();
        let Some(call) = registry.live.remove(room) else {
            return;
        };
        let ended_at = Utc::now();
        let mut record = call.snapshot(room);
        if record.status != CallStatus::Failed {
            record.status = CallStatus::Ended;
        }
        record.ended_at = Some(ended_at);
        record.duration_ms = Some((ended_at - call.started_at).num_milliseconds());
        if registry.finished.len() == CALL_HISTORY {
            registry.finished.pop_front();
        }
        registry.finished.push_back(record);
    }

    pub fn state(&self, room: &str) -> Option<SessionState> {
        self.lock().live.get(room).map(|call| *call.state.borrow())
    }

    pub fn live_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.lock().live.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Finished calls oldest first, followed by live calls ordered by start.
    pub fn records(&self) -> Vec<CallRecord> {
        let registry = self.lock();
        let mut live: Vec<CallRecord> = registry
            .live
            .iter()
            .map(|(room, call)| call.snapshot(room))
            .collect();
        live.sort_by_key(|record| record.started_at);
        registry.finished.iter().cloned().chain(live).collect()
    }
}

/// Closes its call when dropped, including while a job task unwinds.
pub(crate) struct CallGuard {
    log: CallLog,
    room: String,
    state: Arc<watch::Sender<SessionState>>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if std::thread::panicking() && *self.state.borrow() != SessionState::Closed {
            self.state.send_replace(SessionState::Failed);
        }
        self.log.finish(&self.room);
    }
}
