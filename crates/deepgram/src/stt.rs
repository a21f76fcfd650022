use agent_core::{
    AgentError,
    audio::AudioFrame,
    pipeline::{SpeechEvent, SpeechToText, SttOptions, SttStream},
};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info};

pub const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Streaming transcription with Deepgram's live `listen` endpoint.
#[derive(Clone)]
pub struct DeepgramStt {
    api_key: String,
    options: SttOptions,
    url: String,
}

impl DeepgramStt {
    pub fn new(api_key: impl Into<String>, options: SttOptions) -> Self {
        Self {
            api_key: api_key.into(),
            options,
            url: LISTEN_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn options(&self) -> &SttOptions {
        &self.options
    }

    fn listen_url(&self) -> String {
        format!(
            "{}?model={}&language={}&encoding=linear16&sample_rate={}&channels=1&interim_results={}&punctuate={}&smart_format=true",
            self.url,
            self.options.model,
            self.options.language,
            self.options.sample_rate,
            self.options.interim_results,
            self.options.punctuate,
        )
    }

    async fn open(&self) -> Result<SttStream> {
        let mut request = self.listen_url().into_client_request()?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {}", self.api_key))?,
        );
        let (ws_stream, _) = connect_async(request).await?;
        info!(model = %self.options.model, language = %self.options.language, "Connected to Deepgram live transcription.");
        let (mut dg_tx, mut dg_rx) = ws_stream.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioFrame>(256);
        let (events_tx, events) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
            let mut closing = false;
            loop {
                tokio::select! {
                    frame = audio_rx.recv(), if !closing => {
                        let sent = match frame {
                            Some(frame) => dg_tx.send(WsMessage::Binary(frame.to_pcm16_le().into())).await,
                            None => {
                                // Ask Deepgram to flush final results, then drain them.
                                closing = true;
                                dg_tx.send(WsMessage::Text(r#"{"type":"CloseStream"}"#.to_string().into())).await
                            }
                        };
                        if let Err(e) = sent {
                            error!(error = %e, "Failed to write to Deepgram websocket");
                            break;
                        }
                    }
                    _ = keep_alive.tick(), if !closing => {
                        let _ = dg_tx.send(WsMessage::Text(r#"{"type":"KeepAlive"}"#.to_string().into())).await;
                    }
                    msg = dg_rx.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = parse_results(&text) {
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(close_frame))) => {
                            debug!(?close_frame, "Deepgram closed the transcription stream.");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "Error reading from Deepgram websocket");
                            break;
                        }
                        None => break,
                    }
                }
            }
        });

        Ok(SttStream { audio_tx, events })
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn stream(&self) -> Result<SttStream, AgentError> {
        self.open()
            .await
            .map_err(|e| AgentError::component("stt", e))
    }
}

#[derive(Deserialize)]
struct ListenResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    channel: Option<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    transcript: String,
}

/// Extracts the best transcript from a `Results` message.
fn parse_results(text: &str) -> Option<SpeechEvent> {
    let response: ListenResponse = serde_json::from_str(text).ok()?;
    if response.kind != "Results" {
        return None;
    }
    let transcript = response
        .channel?
        .alternatives
        .into_iter()
        .next()?
        .transcript;
    if transcript.is_empty() {
        return None;
    }
    Some(SpeechEvent {
        text: transcript,
        is_final: response.is_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SttOptions {
        SttOptions {
            model: "nova-3".into(),
            language: "multi".into(),
            sample_rate: 16_000,
            interim_results: true,
            punctuate: true,
        }
    }

    #[test]
    fn test_listen_url() {
        let stt = DeepgramStt::new("key", options());
        assert_eq!(
            stt.listen_url(),
            "wss://api.deepgram.com/v1/listen?model=nova-3&language=multi&encoding=linear16&sample_rate=16000&channels=1&interim_results=true&punctuate=true&smart_format=true"
        );

        let local = DeepgramStt::new("key", options()).with_url("ws://127.0.0.1:9000/v1/listen");
        assert!(local.listen_url().starts_with("ws://127.0.0.1:9000/v1/listen?model=nova-3"));
    }

    #[test]
    fn test_parse_final_result() {
        let text = r#"{"type":"Results","is_final":true,"speech_final":true,
            "channel":{"alternatives":[{"transcript":"Tell me about pricing.","confidence":0.98}]}}"#;
        assert_eq!(
            parse_results(text),
            Some(SpeechEvent {
                text: "Tell me about pricing.".into(),
                is_final: true,
            })
        );
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(parse_results(r#"{"type":"Metadata","request_id":"abc"}"#), None);
        assert_eq!(
            parse_results(r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":""}]}}"#),
            None
        );
        assert_eq!(parse_results("not json"), None);
    }
}
