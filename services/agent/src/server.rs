//! HTTP surface of the agent and the websocket bridge between browser
//! clients and rooms.
//!
//! - `POST /rooms` creates a room for an agent type and returns its name.
//! - `GET /rooms/{room}` upgrades to a websocket and dispatches a job for the
//!   room. Binary frames carry PCM16 audio in both directions at
//!   [`CLIENT_SAMPLE_RATE`]; transcripts and playback control go out as JSON
//!   text frames.
//! - `GET /calls` lists the worker's call records.

use crate::{
    audio::{CLIENT_SAMPLE_RATE, InputResampler},
    calls::CallRecord,
    rooms::{DEFAULT_AGENT_TYPE, Participant, RoomDirectory, RoomError, RoomInfo},
    worker::{JobSender, Worker},
};
use agent_core::{
    audio::PIPELINE_SAMPLE_RATE,
    room::{Room, RoomHandle, RoomOutput, Speaker},
};
use anyhow::Result;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, warn};

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Drop any agent audio queued for playback.
    ClearAudio,
    /// A transcript of user or agent speech.
    Transcript {
        speaker: &'static str,
        text: String,
        is_final: bool,
    },
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub agent_type: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct CreateRoomResponse {
    #[serde(flatten)]
    pub room: RoomInfo,
    /// Where the participant connects its websocket.
    pub join_path: String,
}

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobSender,
    pub worker: Worker,
    pub rooms: RoomDirectory,
}

impl AppState {
    pub fn new(jobs: JobSender, worker: Worker) -> Self {
        Self {
            jobs,
            worker,
            rooms: RoomDirectory::default(),
        }
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let status = match self {
            RoomError::InvalidAgentType(_) => StatusCode::BAD_REQUEST,
            RoomError::Full(_) => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Creates the router for room management and the room bridge.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", post(create_room))
        .route("/rooms/{room}", get(ws_handler))
        .route("/calls", get(list_calls))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), RoomError> {
    let agent_type = request.agent_type.as_deref().unwrap_or(DEFAULT_AGENT_TYPE);
    let room = state.rooms.create(agent_type)?;
    let join_path = format!("/rooms/{}", room.name);
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room, join_path })))
}

async fn list_calls(State(state): State<AppState>) -> Json<Vec<CallRecord>> {
    Json(state.worker.call_records())
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
///
/// The participant seat is taken before upgrading, so a second participant
/// is turned away with `409 Conflict`.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let participant = match state.rooms.join(&room) {
        Ok(participant) => participant,
        Err(e) => {
            warn!(room = %room, error = %e, "Connection refused");
            return e.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, room, state, participant))
}

async fn handle_socket(
    socket: WebSocket,
    room_name: String,
    state: AppState,
    _participant: Participant,
) {
    let span = tracing::info_span!("connection", room = %room_name);
    async move {
        info!("New WebSocket connection.");
        let (room, handle) = Room::pair(room_name);
        match state.jobs.dispatch(room).await {
            Ok(job) => debug!(job_id = %job.job_id, "Dispatched job"),
            Err(e) => {
                error!(error = %e, "Could not dispatch job");
                return;
            }
        }
        if let Err(e) = bridge(socket, handle).await {
            warn!("WebSocket bridge error: {e:#}");
        }
        info!("Participant left.");
    }
    .instrument(span)
    .await
}

/// Pumps audio and events until either side goes away. Returning drops the
/// room's audio sender, which closes the room.
async fn bridge(socket: WebSocket, handle: RoomHandle) -> Result<()> {
    let RoomHandle {
        audio_tx,
        mut output_rx,
    } = handle;
    let (mut socket_tx, mut socket_rx) = socket.split();
    let mut resampler = InputResampler::new(CLIENT_SAMPLE_RATE, PIPELINE_SAMPLE_RATE)?;

    loop {
        tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    for frame in resampler.push(&data)? {
                        if audio_tx.send(frame).await.is_err() {
                            info!("Room closed by the agent.");
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    return Ok(());
                }
            },
            output = output_rx.recv() => match output {
                Some(RoomOutput::Audio(frame)) => {
                    socket_tx.send(Message::Binary(frame.to_pcm16_le().into())).await?;
                }
                Some(other) => {
                    if let Some(msg) = to_server_message(other) {
                        send_msg(&mut socket_tx, msg).await?;
                    }
                }
                None => {
                    info!("Agent session ended.");
                    let _ = socket_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

fn to_server_message(output: RoomOutput) -> Option<ServerMessage> {
    match output {
        RoomOutput::Audio(_) => None,
        RoomOutput::ClearAudio => Some(ServerMessage::ClearAudio),
        RoomOutput::Transcript {
            speaker,
            text,
            is_final,
        } => Some(ServerMessage::Transcript {
            speaker: match speaker {
                Speaker::User => "user",
                Speaker::Agent => "agent",
            },
            text,
            is_final,
        }),
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
async fn send_msg(socket_tx: &mut SplitSink<WebSocket, Message>, msg: ServerMessage) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
