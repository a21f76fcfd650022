//! Deepgram speech services: streaming speech-to-text over a websocket and
//! text-to-speech over HTTP.

mod stt;
mod tts;

pub use stt::{DeepgramStt, LISTEN_URL};
pub use tts::{DeepgramTts, SPEAK_URL};
