//! PCM16 audio frames shared by every component.

use std::time::Duration;

/// Sample rate of audio flowing into the pipeline (VAD, STT, model input).
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of audio produced by the model and the TTS engine.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// A chunk of mono PCM16 audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Builds a frame from little-endian PCM16 bytes. A trailing odd byte is dropped.
    pub fn from_pcm16_le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn to_pcm16_le(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Root-mean-square level normalized to `0.0..=1.0`.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / 32768.0;
                v * v
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}
