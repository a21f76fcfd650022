//! In-memory components for exercising sessions without vendor services.

use crate::{
    error::AgentError,
    generic_types::{GenericServerEvent, GenericSessionConfig, RealtimeClientEvent},
    persona::Persona,
    pipeline::{RealtimeConnection, RealtimeModel, SpeechEvent, SpeechToText, SttStream},
    session::SessionHandle,
};
use crate::audio::AudioFrame;
use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

/// Records everything the session sends and lets a test push model events.
#[derive(Default)]
pub(crate) struct FakeModel {
    fail_connect: bool,
    configs: Mutex<Vec<GenericSessionConfig>>,
    client_rx: Mutex<Option<mpsc::Receiver<RealtimeClientEvent>>>,
    seen: Mutex<Vec<RealtimeClientEvent>>,
    server_tx: Mutex<Option<mpsc::Sender<GenericServerEvent>>>,
    /// Cloned into the connection task; its count tells whether the task still runs.
    task_alive: Arc<()>,
}

impl FakeModel {
    /// A model whose connection attempts are refused.
    pub(crate) fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// True while the task of the last connection has not been dropped.
    pub(crate) fn connection_task_running(&self) -> bool {
        Arc::strong_count(&self.task_alive) > 1
    }

    pub(crate) fn configs(&self) -> Vec<GenericSessionConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub(crate) fn client_events(&self) -> Vec<RealtimeClientEvent> {
        let mut seen = self.seen.lock().unwrap();
        if let Some(rx) = self.client_rx.lock().unwrap().as_mut() {
            while let Ok(event) = rx.try_recv() {
                seen.push(event);
            }
        }
        seen.clone()
    }

    /// Polls until an event matching `pred` has been sent to the model.
    pub(crate) async fn wait_for(&self, pred: impl Fn(&RealtimeClientEvent) -> bool) -> bool {
        for _ in 0..200 {
            if self.client_events().iter().any(&pred) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    pub(crate) async fn emit(&self, event: GenericServerEvent) {
        let tx = self
            .server_tx
            .lock()
            .unwrap()
            .clone()
            .expect("model not connected");
        tx.send(event).await.expect("session stopped reading model events");
    }
}

#[async_trait]
impl RealtimeModel for FakeModel {
    async fn connect(&self, config: GenericSessionConfig) -> Result<RealtimeConnection, AgentError> {
        if self.fail_connect {
            return Err(AgentError::component("llm", "connection refused"));
        }
        self.configs.lock().unwrap().push(config);
        let (tx, client_rx) = mpsc::channel(256);
        let (server_tx, events) = mpsc::channel(256);
        *self.client_rx.lock().unwrap() = Some(client_rx);
        *self.server_tx.lock().unwrap() = Some(server_tx);
        let alive = self.task_alive.clone();
        Ok(RealtimeConnection {
            tx,
            events,
            task: tokio::spawn(async move {
                let _alive = alive;
                std::future::pending::<()>().await
            }),
        })
    }
}

/// Swallows audio and lets a test push transcripts.
#[derive(Default)]
pub(crate) struct FakeStt {
    fail_stream: bool,
    audio_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    events_tx: Mutex<Option<mpsc::Sender<SpeechEvent>>>,
}

impl FakeStt {
    /// A transcriber that cannot open a stream.
    pub(crate) fn failing() -> Self {
        Self {
            fail_stream: true,
            ..Self::default()
        }
    }

    pub(crate) async fn emit(&self, text: &str, is_final: bool) {
        let tx = self.events_tx.lock().unwrap().clone().expect("stt not started");
        tx.send(SpeechEvent {
            text: text.to_string(),
            is_final,
        })
        .await
        .expect("session stopped reading transcripts");
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn stream(&self) -> Result<SttStream, AgentError> {
        if self.fail_stream {
            return Err(AgentError::component("stt", "stream rejected"));
        }
        let (audio_tx, audio_rx) = mpsc::channel(256);
        let (events_tx, events) = mpsc::channel(256);
        *self.audio_rx.lock().unwrap() = Some(audio_rx);
        *self.events_tx.lock().unwrap() = Some(events_tx);
        Ok(SttStream { audio_tx, events })
    }
}

/// A persona that counts how often its greeting hook fires.
#[derive(Default)]
pub(crate) struct GreeterPersona {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Persona for GreeterPersona {
    fn instructions(&self) -> &str {
        "You are a test agent."
    }

    fn greeting_instructions(&self) -> &str {
        "Say hello."
    }

    async fn on_enter(&self, session: &SessionHandle) -> Result<(), AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        session.generate_reply(self.greeting_instructions()).await
    }
}
