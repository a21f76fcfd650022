//! The 100X Prompt sales voice agent.
//!
//! - `config`: environment configuration.
//! - `persona`: the sales persona.
//! - `tool_servers`: tool-server descriptors and MCP child-process launch.
//! - `agent`: component construction, session assembly and the job entrypoint.
//! - `worker`: dispatches jobs to the entrypoint, one session per room.
//! - `calls`: per-session call records kept by the worker.
//! - `rooms`: created rooms, participant seats and empty-room expiry.
//! - `audio`: resampling of client audio to the pipeline rate.
//! - `server`: room creation, call records and the websocket bridge.

pub mod agent;
pub mod audio;
pub mod calls;
pub mod config;
pub mod persona;
pub mod rooms;
pub mod server;
pub mod tool_servers;
pub mod worker;
