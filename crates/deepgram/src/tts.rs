use agent_core::{
    AgentError,
    audio::AudioFrame,
    pipeline::{TextToSpeech, TtsOptions},
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::debug;

pub const SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";

/// Milliseconds of audio per emitted frame.
const FRAME_MS: u32 = 100;

/// Text-to-speech with Deepgram's `speak` endpoint, returning raw PCM16.
#[derive(Clone)]
pub struct DeepgramTts {
    client: reqwest::Client,
    api_key: String,
    options: TtsOptions,
    url: String,
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

impl DeepgramTts {
    pub fn new(api_key: impl Into<String>, options: TtsOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            options,
            url: SPEAK_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn options(&self) -> &TtsOptions {
        &self.options
    }

    async fn request(&self, text: &str) -> Result<Vec<AudioFrame>> {
        let query = [
            ("model", self.options.model.clone()),
            ("encoding", "linear16".to_string()),
            ("sample_rate", self.options.sample_rate.to_string()),
            ("container", "none".to_string()),
        ];
        let response = self
            .client
            .post(&self.url)
            .query(&query)
            .header(AUTHORIZATION, format!("Token {}", self.api_key))
            .json(&SpeakRequest { text })
            .send()
            .await?
            .error_for_status()?;
        let audio = response.bytes().await?;
        debug!(bytes = audio.len(), "Received synthesized speech");
        Ok(split_frames(&audio, self.options.sample_rate))
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioFrame>, AgentError> {
        self.request(text)
            .await
            .map_err(|e| AgentError::component("tts", e))
    }
}

fn split_frames(pcm: &[u8], sample_rate: u32) -> Vec<AudioFrame> {
    let bytes_per_frame = ((sample_rate * FRAME_MS / 1000) as usize * 2).max(2);
    pcm.chunks(bytes_per_frame)
        .map(|chunk| AudioFrame::from_pcm16_le(chunk, sample_rate))
        .filter(|frame| !frame.samples.is_empty())
        .collect()
}
