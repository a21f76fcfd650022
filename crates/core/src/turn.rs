//! End-of-utterance heuristics for turn detection.

use crate::pipeline::{TurnDetectionOptions, TurnDetector};
use std::time::Duration;

/// Sentence terminators across the scripts the STT engine emits.
const TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？', '؟', '।'];

/// Trailing words that usually mean the speaker is mid-thought.
const CONTINUATIONS: &[&str] = &[
    "and", "but", "or", "so", "because", "um", "uh", "like", "the", "a", "to", "y", "pero", "et",
    "mais", "und", "aber",
];

/// Picks a short endpointing delay for utterances that look finished and a
/// long one for utterances that trail off.
#[derive(Debug, Clone, Default)]
pub struct MultilingualTurnDetector {
    options: TurnDetectionOptions,
}

impl MultilingualTurnDetector {
    pub fn new(options: TurnDetectionOptions) -> Self {
        Self { options }
    }

    /// Whether `transcript` reads like a complete utterance.
    pub fn is_complete(transcript: &str) -> bool {
        let trimmed = transcript.trim_end();
        if trimmed.is_empty() || trimmed.ends_with(',') {
            return false;
        }
        if trimmed.ends_with(TERMINATORS) {
            return true;
        }
        let last_word = trimmed
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .to_lowercase();
        !CONTINUATIONS.contains(&last_word.as_str())
    }
}

impl TurnDetector for MultilingualTurnDetector {
    fn endpointing_delay(&self, transcript: &str) -> Duration {
        if Self::is_complete(transcript) {
            self.options.min_endpointing_delay
        } else {
            self.options.max_endpointing_delay
        }
    }
}
