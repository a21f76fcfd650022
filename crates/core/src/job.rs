//! The inbound "new connection" signal delivered by the hosting runtime.

use crate::{error::AgentError, room::Room, session::SessionState};
use std::sync::Arc;
use tokio::sync::watch;

/// One dispatched job: a room waiting for an agent.
pub struct JobContext {
    job_id: String,
    room_name: String,
    room: Option<Room>,
    state: Arc<watch::Sender<SessionState>>,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, room: Room) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            job_id: job_id.into(),
            room_name: room.name().to_string(),
            room: Some(room),
            state: Arc::new(state),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Joins the room. A room can be joined once.
    pub fn connect(&mut self) -> Result<Room, AgentError> {
        self.set_state(SessionState::Connecting);
        let room = self.room.take().ok_or_else(|| {
            AgentError::Connection(format!("room '{}' is already connected", self.room_name))
        })?;
        if room.is_closed() {
            return Err(AgentError::Connection(format!(
                "participant left room '{}' before the agent joined",
                self.room_name
            )));
        }
        Ok(room)
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Shares the state channel with an observer such as the worker.
    pub fn state_sender(&self) -> Arc<watch::Sender<SessionState>> {
        self.state.clone()
    }
}
