//! Session assembly and lifecycle.
//!
//! An [`AgentSession`] is built once per connection from a fixed component
//! set and consumed by [`AgentSession::start`], so components cannot be
//! swapped after creation. The returned [`RunningSession`] resolves when the
//! participant leaves or the session is closed.

use crate::{
    activity::Activity,
    error::AgentError,
    generic_types::{GenericSessionConfig, RealtimeClientEvent},
    persona::Persona,
    pipeline::{RealtimeModel, SpeechToText, TextToSpeech, TurnDetector, VoiceActivityDetector},
    room::Room,
    tools::{DEFAULT_TOOL_CALL_TIMEOUT, ToolServer, ToolSet},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{Instrument, info};

/// Lifecycle of the session bound to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Assembling,
    Active,
    Closed,
    /// The session never became active.
    Failed,
}

/// The components a session runs with.
#[derive(Clone)]
pub struct Components {
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn RealtimeModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub turn_detector: Arc<dyn TurnDetector>,
}

#[derive(Default)]
pub struct AgentSessionBuilder {
    vad: Option<Arc<dyn VoiceActivityDetector>>,
    stt: Option<Arc<dyn SpeechToText>>,
    llm: Option<Arc<dyn RealtimeModel>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    turn_detector: Option<Arc<dyn TurnDetector>>,
    tool_servers: Vec<Arc<dyn ToolServer>>,
    tool_call_timeout: Option<Duration>,
}

impl AgentSessionBuilder {
    pub fn vad(mut self, vad: Arc<dyn VoiceActivityDetector>) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn RealtimeModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tts(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn turn_detection(mut self, turn_detector: Arc<dyn TurnDetector>) -> Self {
        self.turn_detector = Some(turn_detector);
        self
    }

    pub fn tool_servers(mut self, servers: Vec<Arc<dyn ToolServer>>) -> Self {
        self.tool_servers = servers;
        self
    }

    /// Bounds each tool call; defaults to [`DEFAULT_TOOL_CALL_TIMEOUT`].
    pub fn tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = Some(timeout);
        self
    }

    /// Fails if any of the five pipeline components is missing.
    pub fn build(self) -> Result<AgentSession, AgentError> {
        Ok(AgentSession {
            components: Components {
                vad: self.vad.ok_or(AgentError::MissingComponent("vad"))?,
                stt: self.stt.ok_or(AgentError::MissingComponent("stt"))?,
                llm: self.llm.ok_or(AgentError::MissingComponent("llm"))?,
                tts: self.tts.ok_or(AgentError::MissingComponent("tts"))?,
                turn_detector: self
                    .turn_detector
                    .ok_or(AgentError::MissingComponent("turn_detection"))?,
            },
            tool_servers: self.tool_servers,
            tool_call_timeout: self.tool_call_timeout.unwrap_or(DEFAULT_TOOL_CALL_TIMEOUT),
        })
    }
}

/// A fully assembled, not yet started session.
pub struct AgentSession {
    components: Components,
    tool_servers: Vec<Arc<dyn ToolServer>>,
    tool_call_timeout: Duration,
}

impl AgentSession {
    pub fn builder() -> AgentSessionBuilder {
        AgentSessionBuilder::default()
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn tool_servers(&self) -> &[Arc<dyn ToolServer>] {
        &self.tool_servers
    }

    /// Binds the session to `persona` and `room` and starts turn-taking.
    ///
    /// The persona's greeting is requested before the first room frame is
    /// read, so it always precedes the reply to any user utterance.
    pub async fn start<P: Persona>(
        self,
        persona: P,
        room: Room,
    ) -> Result<RunningSession, AgentError> {
        let room_name = room.name().to_string();
        let tools = ToolSet::collect(&self.tool_servers)
            .await
            .with_call_timeout(self.tool_call_timeout);

        let connection = self
            .components
            .llm
            .connect(GenericSessionConfig {
                instructions: persona.instructions().to_string(),
                tools: tools.declarations().to_vec(),
            })
            .await?;
        let stt = match self.components.stt.stream().await {
            Ok(stream) => stream,
            Err(e) => {
                connection.task.abort();
                return Err(e);
            }
        };

        let handle = SessionHandle {
            model_tx: connection.tx.clone(),
        };
        if let Err(e) = persona.on_enter(&handle).await {
            connection.task.abort();
            return Err(e);
        }

        let (state_tx, state_rx) = watch::channel(SessionState::Active);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let activity = Activity::new(
            self.components,
            tools,
            connection,
            stt,
            room,
            state_tx,
        );
        let span = tracing::info_span!("session", room = %room_name);
        let task = tokio::spawn(activity.run(shutdown_rx).instrument(span));
        info!(room = %room_name, "Session active");

        Ok(RunningSession {
            room_name,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// What a persona can ask of its session.
pub struct SessionHandle {
    model_tx: mpsc::Sender<RealtimeClientEvent>,
}

impl SessionHandle {
    /// Asks the model to produce and speak a reply steered by `instructions`.
    pub async fn generate_reply(&self, instructions: &str) -> Result<(), AgentError> {
        self.model_tx
            .send(RealtimeClientEvent::GenerateReply {
                instructions: instructions.to_string(),
            })
            .await
            .map_err(|_| AgentError::Closed)
    }
}

/// A started session. Dropping it closes the session.
pub struct RunningSession {
    room_name: String,
    state: watch::Receiver<SessionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), AgentError>>,
}

impl RunningSession {
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Suspends until the connection ends.
    pub async fn wait(self) -> Result<(), AgentError> {
        let RunningSession { shutdown, task, .. } = self;
        let _shutdown = shutdown;
        task.await.map_err(|e| AgentError::Aborted(e.to_string()))?
    }

    /// Ends the session and releases every component handle.
    pub async fn close(mut self) -> Result<(), AgentError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }
}
