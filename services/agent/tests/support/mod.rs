//! Vendor-free components for driving the agent end to end.

#![allow(dead_code)]

use agent_core::{
    AgentError,
    audio::AudioFrame,
    generic_types::{
        GenericServerEvent, GenericSessionConfig, RealtimeClientEvent, ToolDeclaration,
    },
    job::JobContext,
    pipeline::{
        PipelineOptions, RealtimeConnection, RealtimeModel, SpeechToText, SttStream,
        TextToSpeech,
    },
    session::{Components, SessionState},
    tools::ToolServer,
    turn::MultilingualTurnDetector,
    vad::EnergyVad,
};
use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use tracing::Level;
use voice_agent::{
    agent::{ComponentFactory, SessionAssembler},
    config::Config,
    tool_servers::{ToolServerDescriptor, ToolServerKind, ToolServerLauncher},
    worker::{Worker, WorkerOptions},
};

pub fn config(github_token: Option<&str>) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: Level::INFO,
        google_api_key: None,
        deepgram_api_key: None,
        tool_servers: vec![ToolServerKind::Github],
        github_token: github_token.map(str::to_string),
        reddit: None,
    }
}

/// Records every session config and client event it receives.
#[derive(Default)]
pub struct RecordingModel {
    configs: Mutex<Vec<GenericSessionConfig>>,
    events: Arc<Mutex<Vec<RealtimeClientEvent>>>,
    server_txs: Mutex<Vec<mpsc::Sender<GenericServerEvent>>>,
}

impl RecordingModel {
    pub fn configs(&self) -> Vec<GenericSessionConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<RealtimeClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub async fn wait_for_events(&self) -> Vec<RealtimeClientEvent> {
        for _ in 0..200 {
            let events = self.events();
            if !events.is_empty() {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("model never received an event");
    }
}

#[async_trait]
impl RealtimeModel for RecordingModel {
    async fn connect(&self, config: GenericSessionConfig) -> Result<RealtimeConnection, AgentError> {
        self.configs.lock().unwrap().push(config);
        let (tx, mut client_rx) = mpsc::channel(256);
        let (server_tx, events) = mpsc::channel(16);
        self.server_txs.lock().unwrap().push(server_tx);

        let recorded = self.events.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                recorded.lock().unwrap().push(event);
            }
        });
        Ok(RealtimeConnection { tx, events, task })
    }
}

/// Accepts audio and never transcribes anything.
pub struct SilentStt;

#[async_trait]
impl SpeechToText for SilentStt {
    async fn stream(&self) -> Result<SttStream, AgentError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioFrame>(64);
        let (events_tx, events) = mpsc::channel(8);
        tokio::spawn(async move {
            let _events_tx = events_tx;
            while audio_rx.recv().await.is_some() {}
        });
        Ok(SttStream { audio_tx, events })
    }
}

pub struct SilentTts;

#[async_trait]
impl TextToSpeech for SilentTts {
    async fn synthesize(&self, _text: &str) -> Result<Vec<AudioFrame>, AgentError> {
        Ok(Vec::new())
    }
}

/// Builds fake components and remembers the options it was asked for.
#[derive(Default)]
pub struct FakeComponents {
    pub model: Arc<RecordingModel>,
    options: Mutex<Vec<PipelineOptions>>,
}

impl FakeComponents {
    pub fn options(&self) -> Vec<PipelineOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl ComponentFactory for FakeComponents {
    fn build(&self, options: &PipelineOptions) -> Result<Components, AgentError> {
        self.options.lock().unwrap().push(options.clone());
        Ok(Components {
            vad: Arc::new(EnergyVad::new(options.vad.clone())),
            stt: Arc::new(SilentStt),
            llm: self.model.clone(),
            tts: Arc::new(SilentTts),
            turn_detector: Arc::new(MultilingualTurnDetector::new(
                options.turn_detection.clone(),
            )),
        })
    }
}

/// A tool-server with one static tool.
pub struct StaticToolServer {
    name: String,
}

#[async_trait]
impl ToolServer for StaticToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>, AgentError> {
        Ok(vec![ToolDeclaration {
            name: "search_repositories".to_string(),
            description: "Search GitHub repositories".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } }
            }),
        }])
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: serde_json::Value,
    ) -> Result<String, AgentError> {
        Ok("[]".to_string())
    }
}

/// Counts launches instead of spawning processes.
#[derive(Default)]
pub struct CountingLauncher {
    launches: AtomicUsize,
}

impl CountingLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServerLauncher for CountingLauncher {
    async fn launch(
        &self,
        descriptor: &ToolServerDescriptor,
    ) -> anyhow::Result<Arc<dyn ToolServer>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StaticToolServer {
            name: descriptor.name.clone(),
        }))
    }
}

pub fn worker(assembler: SessionAssembler) -> Worker {
    Worker::new(WorkerOptions::new(move |ctx: JobContext| {
        let assembler = assembler.clone();
        async move { assembler.entrypoint(ctx).await }
    }))
}

pub async fn wait_for_state(state: &mut watch::Receiver<SessionState>, expected: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == expected))
        .await
        .unwrap_or_else(|_| panic!("session never reached {expected:?}"))
        .unwrap_or_else(|_| panic!("job ended before reaching {expected:?}"));
}

/// A 20 ms frame well above the speech threshold.
pub fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![8_000; 320], 16_000)
}
