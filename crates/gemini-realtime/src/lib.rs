//! Gemini Live realtime model.
//!
//! Opens a `BidiGenerateContent` websocket, performs the setup handshake and
//! then proxies session events in both directions from a background task.
//! Turn boundaries come from the session (automatic activity detection is
//! disabled), so the session's own VAD and turn detector decide when the
//! model answers.

pub mod types;

use agent_core::{
    AgentError,
    audio::{AudioFrame, OUTPUT_SAMPLE_RATE},
    generic_types::{GenericServerEvent, GenericSessionConfig, RealtimeClientEvent, ToolCall},
    pipeline::{BuiltinTool, Modality, RealtimeConnection, RealtimeModel, RealtimeModelOptions},
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};
use types::*;

pub const LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// A realtime model served by the Gemini Live API.
#[derive(Clone)]
pub struct GeminiRealtimeModel {
    api_key: String,
    options: RealtimeModelOptions,
    url: String,
}

impl GeminiRealtimeModel {
    pub fn new(api_key: impl Into<String>, options: RealtimeModelOptions) -> Self {
        Self {
            api_key: api_key.into(),
            options,
            url: LIVE_API_URL.to_string(),
        }
    }

    /// Points the model at a different websocket endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn options(&self) -> &RealtimeModelOptions {
        &self.options
    }

    fn setup_message(&self, config: &GenericSessionConfig) -> ClientMessage {
        let (response_modality, speech_config) = match self.options.modality {
            Modality::Audio => (
                ResponseModality::Audio,
                Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.options.voice.clone(),
                        },
                    },
                }),
            ),
            Modality::Text => (ResponseModality::Text, None),
        };

        let mut tools: Vec<Tool> = self
            .options
            .builtin_tools
            .iter()
            .map(|tool| match tool {
                BuiltinTool::GoogleSearch => Tool::GoogleSearch(Empty {}),
            })
            .collect();
        if !config.tools.is_empty() {
            tools.push(Tool::FunctionDeclarations(
                config
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            ));
        }

        let model = if self.options.model.starts_with("models/") {
            self.options.model.clone()
        } else {
            format!("models/{}", self.options.model)
        };

        ClientMessage::Setup(BidiGenerateContentSetup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![response_modality],
                temperature: self.options.temperature,
                speech_config,
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: config.instructions.clone(),
                }],
            },
            tools,
            realtime_input_config: RealtimeInputConfig {
                automatic_activity_detection: AutomaticActivityDetection { disabled: true },
            },
            input_audio_transcription: Empty {},
            output_audio_transcription: Empty {},
        })
    }

    async fn open(&self, config: GenericSessionConfig) -> Result<RealtimeConnection> {
        let url = format!("{}?key={}", self.url, self.api_key);
        let (ws_stream, _) = connect_async(url).await?;
        info!(model = %self.options.model, "Connected to Gemini Live websocket.");
        let (mut gemini_tx, mut gemini_rx) = ws_stream.split();

        let setup_msg = self.setup_message(&config);
        gemini_tx
            .send(WsMessage::Text(serde_json::to_string(&setup_msg)?.into()))
            .await?;

        // Nothing may be sent until the server acknowledges the setup.
        loop {
            let payload = match gemini_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
                Some(Ok(WsMessage::Close(close_frame))) => {
                    bail!("Gemini closed the connection during setup: {:?}", close_frame)
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => bail!("Gemini connection ended during setup"),
            };
            let msg: ServerMessage = serde_json::from_slice(&payload)
                .map_err(|e| anyhow!("Failed to parse Gemini setup reply: {e}"))?;
            if msg.setup_complete.is_some() {
                info!("Gemini session setup is complete. Ready for bidirectional streaming.");
                break;
            }
            warn!("Received unexpected message during Gemini setup. Ignoring.");
        }

        let (tx, mut rx) = mpsc::channel::<RealtimeClientEvent>(128);
        let (events_tx, events) = mpsc::channel(128);
        let modality = self.options.modality;

        let task = tokio::spawn(async move {
            let mut transcript = AgentTranscript::default();
            let result: Result<()> = async {
                loop {
                    tokio::select! {
                        event = rx.recv() => {
                            let Some(event) = event else {
                                let _ = gemini_tx.close().await;
                                break;
                            };
                            let msg = encode_client_event(event);
                            gemini_tx.send(WsMessage::Text(serde_json::to_string(&msg)?.into())).await?;
                        }
                        msg_result = gemini_rx.next() => {
                            let payload = match msg_result {
                                Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
                                Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
                                Some(Ok(WsMessage::Close(close_frame))) => {
                                    info!(?close_frame, "Gemini websocket closed by server.");
                                    break;
                                }
                                Some(Ok(_)) => continue,
                                Some(Err(e)) => return Err(e.into()),
                                None => break,
                            };
                            match serde_json::from_slice::<ServerMessage>(&payload) {
                                Ok(msg) => {
                                    for event in translate_server_message(msg, modality, &mut transcript) {
                                        if events_tx.send(event).await.is_err() {
                                            return Ok(());
                                        }
                                    }
                                }
                                Err(e) => error!(error = %e, "Failed to parse Gemini message"),
                            }
                        }
                    }
                }
                Ok(())
            }
            .await;

            if let Err(e) = result {
                error!(error = ?e, "Gemini realtime task failed");
                let _ = events_tx
                    .send(GenericServerEvent::Error(e.to_string()))
                    .await;
            }
            let _ = events_tx.send(GenericServerEvent::Closed).await;
        });

        Ok(RealtimeConnection { tx, events, task })
    }
}

#[async_trait]
impl RealtimeModel for GeminiRealtimeModel {
    async fn connect(&self, config: GenericSessionConfig) -> Result<RealtimeConnection, AgentError> {
        self.open(config)
            .await
            .map_err(|e| AgentError::component("llm", e))
    }
}

/// Maps a session event to its Gemini client message.
fn encode_client_event(event: RealtimeClientEvent) -> ClientMessage {
    match event {
        RealtimeClientEvent::Audio(frame) => {
            ClientMessage::RealtimeInput(BidiGenerateContentRealtimeInput {
                audio: Some(Blob {
                    mime_type: format!("audio/pcm;rate={}", frame.sample_rate),
                    data: base64::engine::general_purpose::STANDARD.encode(frame.to_pcm16_le()),
                }),
                ..Default::default()
            })
        }
        RealtimeClientEvent::ActivityStart => {
            ClientMessage::RealtimeInput(BidiGenerateContentRealtimeInput {
                activity_start: Some(Empty {}),
                ..Default::default()
            })
        }
        RealtimeClientEvent::ActivityEnd => {
            ClientMessage::RealtimeInput(BidiGenerateContentRealtimeInput {
                activity_end: Some(Empty {}),
                ..Default::default()
            })
        }
        RealtimeClientEvent::GenerateReply { instructions } => {
            ClientMessage::ClientContent(BidiGenerateContentClientContent {
                turns: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: instructions }],
                }],
                turn_complete: true,
            })
        }
        RealtimeClientEvent::ToolResponses(results) => {
            ClientMessage::ToolResponse(BidiGenerateContentToolResponse {
                function_responses: results
                    .into_iter()
                    .map(|r| FunctionResponse {
                        id: r.id,
                        name: r.name,
                        response: r.output,
                    })
                    .collect(),
            })
        }
    }
}

/// Output transcription of the model turn in progress. Gemini sends it in
/// pieces; the whole text is repeated as final once the turn ends.
#[derive(Debug, Default)]
struct AgentTranscript {
    text: String,
}

impl AgentTranscript {
    fn finish(&mut self, events: &mut Vec<GenericServerEvent>) {
        let text = std::mem::take(&mut self.text);
        if !text.trim().is_empty() {
            events.push(GenericServerEvent::Transcription {
                text: text.trim().to_string(),
                is_final: true,
            });
        }
    }
}

/// Maps one Gemini server message to the session events it carries.
fn translate_server_message(
    msg: ServerMessage,
    modality: Modality,
    transcript: &mut AgentTranscript,
) -> Vec<GenericServerEvent> {
    let mut events = Vec::new();

    if let Some(content) = msg.server_content {
        if content.interrupted == Some(true) {
            events.push(GenericServerEvent::Interrupted);
            transcript.finish(&mut events);
        }
        if let Some(transcription) = content.input_transcription {
            // User transcripts come from the session's own STT stream.
            debug!(text = %transcription.text, "Gemini input transcription");
        }
        if let Some(model_turn) = content.model_turn {
            events.push(GenericServerEvent::Speaking);
            for part in model_turn.parts {
                if let Some(blob) = part.inline_data {
                    match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                        Ok(bytes) => events.push(GenericServerEvent::AudioChunk(
                            AudioFrame::from_pcm16_le(&bytes, OUTPUT_SAMPLE_RATE),
                        )),
                        Err(e) => error!(error = %e, "Failed to decode Gemini audio chunk"),
                    }
                }
                if let Some(text) = part.text {
                    if modality == Modality::Text && !text.is_empty() {
                        events.push(GenericServerEvent::Text(text));
                    }
                }
            }
        }
        if let Some(transcription) = content.output_transcription {
            transcript.text.push_str(&transcription.text);
            events.push(GenericServerEvent::Transcription {
                text: transcription.text,
                is_final: false,
            });
        }
        if content.turn_complete == Some(true) {
            transcript.finish(&mut events);
            events.push(GenericServerEvent::SpeakingDone);
        }
    }

    if let Some(tool_call) = msg.tool_call {
        events.push(GenericServerEvent::ToolCalls(
            tool_call
                .function_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.name,
                    arguments: call.args,
                })
                .collect(),
        ));
    }

    if msg.go_away.is_some() {
        events.push(GenericServerEvent::Error(
            "Gemini server is about to close the session".to_string(),
        ));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::generic_types::{ToolDeclaration, ToolResult};
    use serde_json::json;

    fn options(modality: Modality) -> RealtimeModelOptions {
        RealtimeModelOptions {
            model: "gemini-live-2.5-flash-preview".into(),
            voice: "Puck".into(),
            temperature: 0.8,
            modality,
            builtin_tools: vec![BuiltinTool::GoogleSearch],
        }
    }

    fn to_json(msg: &ClientMessage) -> serde_json::Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn test_setup_message() {
        let model = GeminiRealtimeModel::new("key", options(Modality::Audio));
        let msg = model.setup_message(&GenericSessionConfig {
            instructions: "Be helpful.".into(),
            tools: vec![ToolDeclaration {
                name: "search_repositories".into(),
                description: "Search GitHub".into(),
                parameters: json!({ "type": "object" }),
            }],
        });

        let value = to_json(&msg);
        let setup = &value["setup"];
        assert_eq!(setup["model"], "models/gemini-live-2.5-flash-preview");
        assert_eq!(setup["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        let temperature = setup["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.8).abs() < 1e-6);
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"], json!({ "parts": [{ "text": "Be helpful." }] }));
        assert_eq!(setup["tools"][0], json!({ "googleSearch": {} }));
        assert_eq!(
            setup["tools"][1]["functionDeclarations"][0]["name"],
            "search_repositories"
        );
        assert_eq!(
            setup["realtimeInputConfig"]["automaticActivityDetection"]["disabled"],
            true
        );
        assert_eq!(setup["outputAudioTranscription"], json!({}));
    }

    #[test]
    fn test_setup_message_text_modality_without_tools() {
        let mut opts = options(Modality::Text);
        opts.builtin_tools.clear();
        opts.model = "models/gemini-2.0-flash-exp".into();
        let model = GeminiRealtimeModel::new("key", opts);

        let value = to_json(&model.setup_message(&GenericSessionConfig::default()));
        let setup = &value["setup"];
        assert_eq!(setup["model"], "models/gemini-2.0-flash-exp");
        assert_eq!(setup["generationConfig"]["responseModalities"], json!(["TEXT"]));
        assert!(setup["generationConfig"].get("speechConfig").is_none());
        assert!(setup.get("tools").is_none());
    }

    #[test]
    fn test_encode_client_events() {
        let audio = encode_client_event(RealtimeClientEvent::Audio(AudioFrame::new(
            vec![1, -1],
            16_000,
        )));
        assert_eq!(
            to_json(&audio),
            json!({ "realtimeInput": { "audio": { "mimeType": "audio/pcm;rate=16000", "data": "AQD//w==" } } })
        );

        assert_eq!(
            to_json(&encode_client_event(RealtimeClientEvent::ActivityStart)),
            json!({ "realtimeInput": { "activityStart": {} } })
        );
        assert_eq!(
            to_json(&encode_client_event(RealtimeClientEvent::ActivityEnd)),
            json!({ "realtimeInput": { "activityEnd": {} } })
        );

        let reply = encode_client_event(RealtimeClientEvent::GenerateReply {
            instructions: "Greet the caller.".into(),
        });
        assert_eq!(
            to_json(&reply),
            json!({ "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": "Greet the caller." }] }],
                "turnComplete": true
            } })
        );

        let tools = encode_client_event(RealtimeClientEvent::ToolResponses(vec![ToolResult {
            id: "fc-1".into(),
            name: "search_repositories".into(),
            output: json!({ "output": "[]" }),
        }]));
        assert_eq!(
            to_json(&tools),
            json!({ "toolResponse": { "functionResponses": [
                { "id": "fc-1", "name": "search_repositories", "response": { "output": "[]" } }
            ] } })
        );
    }

    #[test]
    fn test_translate_audio_turn() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQD//w==" } },
                    { "text": "thinking" }
                ] },
                "outputTranscription": { "text": "Hello" },
                "turnComplete": true
            }
        }))
        .unwrap();

        let events = translate_server_message(msg, Modality::Audio, &mut AgentTranscript::default());
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], GenericServerEvent::Speaking));
        match &events[1] {
            GenericServerEvent::AudioChunk(frame) => {
                assert_eq!(frame.samples, vec![1, -1]);
                assert_eq!(frame.sample_rate, OUTPUT_SAMPLE_RATE);
            }
            other => panic!("expected audio, got {other:?}"),
        }
        assert!(matches!(
            &events[2],
            GenericServerEvent::Transcription { text, is_final: false } if text == "Hello"
        ));
        assert!(matches!(
            &events[3],
            GenericServerEvent::Transcription { text, is_final: true } if text == "Hello"
        ));
        assert!(matches!(events[4], GenericServerEvent::SpeakingDone));
    }

    #[test]
    fn test_agent_transcript_is_finalized_when_the_turn_ends() {
        let mut transcript = AgentTranscript::default();
        let piece = |text: &str| -> ServerMessage {
            serde_json::from_value(json!({
                "serverContent": { "outputTranscription": { "text": text } }
            }))
            .unwrap()
        };

        let events = translate_server_message(piece("Our plans"), Modality::Audio, &mut transcript);
        assert!(matches!(
            &events[..],
            [GenericServerEvent::Transcription { is_final: false, .. }]
        ));
        translate_server_message(piece(" start at $10."), Modality::Audio, &mut transcript);

        let done: ServerMessage =
            serde_json::from_value(json!({ "serverContent": { "turnComplete": true } })).unwrap();
        let events = translate_server_message(done, Modality::Audio, &mut transcript);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            GenericServerEvent::Transcription { text, is_final: true }
                if text == "Our plans start at $10."
        ));
        assert!(matches!(events[1], GenericServerEvent::SpeakingDone));

        // The next turn starts from an empty transcript.
        let done: ServerMessage =
            serde_json::from_value(json!({ "serverContent": { "turnComplete": true } })).unwrap();
        let events = translate_server_message(done, Modality::Audio, &mut transcript);
        assert!(matches!(&events[..], [GenericServerEvent::SpeakingDone]));
    }

    #[test]
    fn test_interruption_finalizes_partial_transcript() {
        let mut transcript = AgentTranscript::default();
        let piece: ServerMessage = serde_json::from_value(json!({
            "serverContent": { "outputTranscription": { "text": "Let me tell you" } }
        }))
        .unwrap();
        translate_server_message(piece, Modality::Audio, &mut transcript);

        let interrupted: ServerMessage =
            serde_json::from_value(json!({ "serverContent": { "interrupted": true } })).unwrap();
        let events = translate_server_message(interrupted, Modality::Audio, &mut transcript);
        assert!(matches!(events[0], GenericServerEvent::Interrupted));
        assert!(matches!(
            &events[1],
            GenericServerEvent::Transcription { text, is_final: true } if text == "Let me tell you"
        ));
    }

    #[test]
    fn test_translate_text_modality_and_interruption() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "interrupted": true,
                "modelTurn": { "parts": [{ "text": "Hi there" }] }
            }
        }))
        .unwrap();

        let events = translate_server_message(msg, Modality::Text, &mut AgentTranscript::default());
        assert!(matches!(events[0], GenericServerEvent::Interrupted));
        assert!(matches!(events[1], GenericServerEvent::Speaking));
        assert!(matches!(&events[2], GenericServerEvent::Text(t) if t == "Hi there"));
    }

    #[test]
    fn test_translate_tool_call_and_go_away() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "toolCall": { "functionCalls": [
                { "id": "fc-9", "name": "get_issue", "args": { "number": 42 } }
            ] },
            "goAway": { "timeLeft": "10s" }
        }))
        .unwrap();

        let events = translate_server_message(msg, Modality::Audio, &mut AgentTranscript::default());
        match &events[0] {
            GenericServerEvent::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "fc-9");
                assert_eq!(calls[0].name, "get_issue");
                assert_eq!(calls[0].arguments, json!({ "number": 42 }));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert!(matches!(events[1], GenericServerEvent::Error(_)));
    }

    #[test]
    fn test_setup_complete_only_yields_nothing() {
        let msg: ServerMessage = serde_json::from_value(json!({ "setupComplete": {} })).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(translate_server_message(msg, Modality::Audio, &mut AgentTranscript::default()).is_empty());
    }
}
