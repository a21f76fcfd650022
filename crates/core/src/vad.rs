//! Energy-based voice-activity detection.

use crate::{
    audio::AudioFrame,
    pipeline::{VadEvent, VadOptions, VadStream, VoiceActivityDetector},
};
use std::time::Duration;

/// Detects speech from frame loudness, with hysteresis on both edges.
#[derive(Debug, Clone, Default)]
pub struct EnergyVad {
    options: VadOptions,
}

impl EnergyVad {
    pub fn new(options: VadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &VadOptions {
        &self.options
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn stream(&self) -> Box<dyn VadStream> {
        Box::new(EnergyVadStream {
            options: self.options.clone(),
            speaking: false,
            speech_run: Duration::ZERO,
            silence_run: Duration::ZERO,
        })
    }
}

struct EnergyVadStream {
    options: VadOptions,
    speaking: bool,
    speech_run: Duration,
    silence_run: Duration,
}

impl VadStream for EnergyVadStream {
    fn push_frame(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        let duration = frame.duration();
        if frame.rms() >= self.options.activation_threshold {
            self.silence_run = Duration::ZERO;
            self.speech_run += duration;
            if !self.speaking && self.speech_run >= self.options.min_speech_duration {
                self.speaking = true;
                return Some(VadEvent::StartOfSpeech);
            }
        } else {
            self.speech_run = Duration::ZERO;
            self.silence_run += duration;
            if self.speaking && self.silence_run >= self.options.min_silence_duration {
                self.speaking = false;
                return Some(VadEvent::EndOfSpeech);
            }
        }
        None
    }
}
