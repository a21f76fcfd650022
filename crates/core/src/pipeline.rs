//! Component contracts for the speech pipeline.
//!
//! Each component is constructed once per session and held behind an `Arc`.
//! Per-session mutable state (detector history, open sockets) lives in the
//! streams and connections they hand out, never in the component itself.

use crate::{
    audio::AudioFrame,
    error::AgentError,
    generic_types::{GenericServerEvent, GenericSessionConfig, RealtimeClientEvent},
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};

// --- Options ---

/// Tuning for voice-activity detection.
#[derive(Debug, Clone, PartialEq)]
pub struct VadOptions {
    /// Normalized RMS level above which a frame counts as speech.
    pub activation_threshold: f32,
    /// Continuous speech required before reporting start-of-speech.
    pub min_speech_duration: Duration,
    /// Continuous silence required before reporting end-of-speech.
    pub min_silence_duration: Duration,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self {
            activation_threshold: 0.02,
            min_speech_duration: Duration::from_millis(50),
            min_silence_duration: Duration::from_millis(550),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SttOptions {
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
    pub interim_results: bool,
    pub punctuate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TtsOptions {
    pub model: String,
    pub sample_rate: u32,
}

/// What the realtime model answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Audio,
    Text,
}

/// Provider-hosted tools the model can use without a tool-server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    GoogleSearch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeModelOptions {
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub modality: Modality,
    pub builtin_tools: Vec<BuiltinTool>,
}

/// Endpointing delays applied once the user stops speaking.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDetectionOptions {
    /// Wait used when the utterance looks complete.
    pub min_endpointing_delay: Duration,
    /// Wait used when the user is probably not done yet.
    pub max_endpointing_delay: Duration,
}

impl Default for TurnDetectionOptions {
    fn default() -> Self {
        Self {
            min_endpointing_delay: Duration::from_millis(500),
            max_endpointing_delay: Duration::from_secs(6),
        }
    }
}

/// The fixed parameters every component of a session is built with.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub vad: VadOptions,
    pub stt: SttOptions,
    pub llm: RealtimeModelOptions,
    pub tts: TtsOptions,
    pub turn_detection: TurnDetectionOptions,
}

// --- Voice activity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    StartOfSpeech,
    EndOfSpeech,
}

pub trait VoiceActivityDetector: Send + Sync {
    /// Opens a fresh detector state for one audio stream.
    fn stream(&self) -> Box<dyn VadStream>;
}

pub trait VadStream: Send + Sync {
    /// Feeds one frame and reports a speech boundary if this frame crossed one.
    fn push_frame(&mut self, frame: &AudioFrame) -> Option<VadEvent>;
}

// --- Speech to text ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechEvent {
    pub text: String,
    pub is_final: bool,
}

/// A live transcription stream. Dropping `audio_tx` ends the stream.
pub struct SttStream {
    pub audio_tx: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<SpeechEvent>,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn stream(&self) -> Result<SttStream, AgentError>;
}

// --- Text to speech ---

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioFrame>, AgentError>;
}

// --- Turn detection ---

pub trait TurnDetector: Send + Sync {
    /// How long to wait after end-of-speech before closing the user's turn.
    fn endpointing_delay(&self, transcript: &str) -> Duration;
}

// --- Realtime model ---

/// An open connection to a realtime model.
///
/// The provider runs in `task`; dropping `tx` asks it to shut down.
pub struct RealtimeConnection {
    pub tx: mpsc::Sender<RealtimeClientEvent>,
    pub events: mpsc::Receiver<GenericServerEvent>,
    pub task: JoinHandle<()>,
}

#[async_trait]
pub trait RealtimeModel: Send + Sync {
    async fn connect(&self, config: GenericSessionConfig) -> Result<RealtimeConnection, AgentError>;
}
