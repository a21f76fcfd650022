//! Core building blocks for scripted-persona voice sessions.
//!
//! A session binds one [`room::Room`] to a fixed set of speech components
//! (voice-activity detection, speech-to-text, a realtime language model,
//! text-to-speech and turn detection) and a [`persona::Persona`]. Vendor
//! clients live in their own crates and plug in through the traits in
//! [`pipeline`] and [`tools`].

mod activity;
pub mod audio;
pub mod error;
pub mod generic_types;
pub mod job;
pub mod persona;
pub mod pipeline;
pub mod room;
pub mod session;
#[cfg(test)]
mod testing;
pub mod tools;
pub mod turn;
pub mod vad;

pub use error::AgentError;
