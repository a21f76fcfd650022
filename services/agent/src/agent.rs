//! Builds and runs one agent session per job.

use crate::{
    config::Config,
    persona::SalesAgent,
    tool_servers::{McpLauncher, ToolServerLauncher, descriptors, launch_all},
};
use agent_core::{
    AgentError,
    audio::{OUTPUT_SAMPLE_RATE, PIPELINE_SAMPLE_RATE},
    job::JobContext,
    pipeline::{
        BuiltinTool, Modality, PipelineOptions, RealtimeModelOptions, SttOptions,
        TurnDetectionOptions, TtsOptions, VadOptions,
    },
    session::{AgentSession, Components, SessionState},
    turn::MultilingualTurnDetector,
    vad::EnergyVad,
};
use anyhow::Context;
use deepgram_speech::{DeepgramStt, DeepgramTts};
use gemini_realtime::GeminiRealtimeModel;
use std::sync::Arc;
use tracing::info;

pub const AGENT_NAME: &str = "100X Prompt Sales Agent";

/// The fixed parameters every session's components are built with.
pub fn pipeline_options() -> PipelineOptions {
    PipelineOptions {
        vad: VadOptions::default(),
        stt: SttOptions {
            model: "nova-3".to_string(),
            language: "multi".to_string(),
            sample_rate: PIPELINE_SAMPLE_RATE,
            interim_results: true,
            punctuate: true,
        },
        llm: RealtimeModelOptions {
            model: "gemini-live-2.5-flash-preview".to_string(),
            voice: "Puck".to_string(),
            temperature: 0.8,
            modality: Modality::Audio,
            builtin_tools: vec![BuiltinTool::GoogleSearch],
        },
        tts: TtsOptions {
            model: "aura-2-andromeda-en".to_string(),
            sample_rate: OUTPUT_SAMPLE_RATE,
        },
        turn_detection: TurnDetectionOptions::default(),
    }
}

/// Constructs the five pipeline components of a session.
pub trait ComponentFactory: Send + Sync {
    fn build(&self, options: &PipelineOptions) -> Result<Components, AgentError>;
}

/// Vendor-backed components: Gemini Live for the model, Deepgram for speech.
#[derive(Clone, Default)]
pub struct VendorComponents {
    google_api_key: Option<String>,
    deepgram_api_key: Option<String>,
}

impl VendorComponents {
    pub fn from_config(config: &Config) -> Self {
        Self {
            google_api_key: config.google_api_key.clone(),
            deepgram_api_key: config.deepgram_api_key.clone(),
        }
    }
}

fn require<'a>(
    key: &'a Option<String>,
    component: &'static str,
    var: &str,
) -> Result<&'a str, AgentError> {
    key.as_deref()
        .ok_or_else(|| AgentError::component(component, format!("{var} is not set")))
}

impl ComponentFactory for VendorComponents {
    fn build(&self, options: &PipelineOptions) -> Result<Components, AgentError> {
        let deepgram_key = require(&self.deepgram_api_key, "stt", "DEEPGRAM_API_KEY")?;
        let google_key = require(&self.google_api_key, "llm", "GOOGLE_API_KEY")?;

        Ok(Components {
            vad: Arc::new(EnergyVad::new(options.vad.clone())),
            stt: Arc::new(DeepgramStt::new(deepgram_key, options.stt.clone())),
            llm: Arc::new(GeminiRealtimeModel::new(google_key, options.llm.clone())),
            tts: Arc::new(DeepgramTts::new(deepgram_key, options.tts.clone())),
            turn_detector: Arc::new(MultilingualTurnDetector::new(
                options.turn_detection.clone(),
            )),
        })
    }
}

/// Assembles sessions from configuration and runs the job entrypoint.
#[derive(Clone)]
pub struct SessionAssembler {
    config: Arc<Config>,
    factory: Arc<dyn ComponentFactory>,
    launcher: Arc<dyn ToolServerLauncher>,
}

impl SessionAssembler {
    pub fn new(
        config: Arc<Config>,
        factory: Arc<dyn ComponentFactory>,
        launcher: Arc<dyn ToolServerLauncher>,
    ) -> Self {
        Self {
            config,
            factory,
            launcher,
        }
    }

    /// Vendor components and MCP tool-servers.
    pub fn from_config(config: Arc<Config>) -> Self {
        let factory = Arc::new(VendorComponents::from_config(&config));
        Self::new(config, factory, Arc::new(McpLauncher::default()))
    }

    /// Builds one session. Components are constructed before any tool-server
    /// process is started, so a missing key leaves nothing running.
    pub async fn assemble(&self) -> Result<AgentSession, AgentError> {
        let descriptors = descriptors(&self.config);
        let components = self.factory.build(&pipeline_options())?;
        let tool_servers = launch_all(self.launcher.as_ref(), &descriptors).await;

        AgentSession::builder()
            .vad(components.vad)
            .stt(components.stt)
            .llm(components.llm)
            .tts(components.tts)
            .turn_detection(components.turn_detector)
            .tool_servers(tool_servers)
            .build()
    }

    /// Handles one job: joins the room, starts the sales session and waits
    /// until the participant leaves.
    pub async fn entrypoint(&self, mut ctx: JobContext) -> anyhow::Result<()> {
        let room = ctx.connect()?;
        info!("{AGENT_NAME} connecting to room: {}", ctx.room_name());

        ctx.set_state(SessionState::Assembling);
        let session = self
            .assemble()
            .await
            .context("Failed to assemble agent session")?;
        let running = session
            .start(SalesAgent, room)
            .await
            .context("Failed to start agent session")?;
        ctx.set_state(SessionState::Active);
        info!(
            "{AGENT_NAME} started successfully in room: {}",
            ctx.room_name()
        );

        let result = running.wait().await;
        ctx.set_state(SessionState::Closed);
        info!("Session in room {} ended", ctx.room_name());
        result.context("Agent session ended with an error")
    }
}
