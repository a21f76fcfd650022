use crate::audio::AudioFrame;
use serde::{Deserialize, Serialize};

/// Generic configuration for initializing a realtime model session with any provider.
#[derive(Debug, Clone, Default)]
pub struct GenericSessionConfig {
    pub instructions: String,
    /// Function tools exposed by the session's tool-servers.
    pub tools: Vec<ToolDeclaration>,
}

/// Events the session sends to a realtime model connection.
#[derive(Debug, Clone)]
pub enum RealtimeClientEvent {
    /// A chunk of user audio at the pipeline sample rate.
    Audio(AudioFrame),
    /// The user started speaking.
    ActivityStart,
    /// The user's turn is over and the model should reply.
    ActivityEnd,
    /// Ask the model to speak now, steered by `instructions`.
    GenerateReply { instructions: String },
    /// Results for tool calls the model requested.
    ToolResponses(Vec<ToolResult>),
}

/// Generic events that any realtime provider can emit back to the session.
#[derive(Debug, Clone)]
pub enum GenericServerEvent {
    /// A transcription of the model's own speech.
    Transcription { text: String, is_final: bool },
    /// A chunk of spoken audio from the model.
    AudioChunk(AudioFrame),
    /// Text output from a model running without an audio modality.
    Text(String),
    /// The model is about to start speaking.
    Speaking,
    /// The model finished its turn.
    SpeakingDone,
    /// The model dropped its current reply because the user barged in.
    Interrupted,
    /// The model wants one or more tools executed.
    ToolCalls(Vec<ToolCall>),
    /// An error from the provider.
    Error(String),
    /// The connection was closed.
    Closed,
}

/// A function tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub output: serde_json::Value,
}
