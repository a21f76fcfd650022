//! The turn-taking loop of an active session.
//!
//! Room audio is fed to the voice-activity detector, the model and the STT
//! stream. Speech boundaries become activity signals for the model; the end
//! of the user's turn is delayed by the turn detector's endpointing delay.
//! Model output flows back to the room, with text synthesized through TTS.
//!
//! Tool calls and speech synthesis run beside the loop, so a slow tool-server
//! or TTS request never holds up audio, model events or shutdown.

use crate::{
    audio::AudioFrame,
    error::AgentError,
    generic_types::{GenericServerEvent, RealtimeClientEvent, ToolResult},
    pipeline::{RealtimeConnection, SpeechEvent, SttStream, TextToSpeech, VadEvent, VadStream},
    room::{Room, RoomOutput, Speaker},
    session::{Components, SessionState},
    tools::ToolSet,
};
use std::sync::Arc;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot, watch,
    },
    task::{JoinHandle, JoinSet},
    time::{Instant, sleep_until},
};
use tracing::{Instrument, debug, info, warn};

/// Text replies waiting for synthesis.
const SPEECH_QUEUE: usize = 32;

pub(crate) struct Activity {
    components: Components,
    tools: Arc<ToolSet>,
    room_name: String,
    audio_in: mpsc::Receiver<AudioFrame>,
    model_events: mpsc::Receiver<GenericServerEvent>,
    stt_events: mpsc::Receiver<SpeechEvent>,
    turn: TurnState,
    state_tx: watch::Sender<SessionState>,
}

/// Mutable per-turn state, kept apart from the receivers polled in `run`.
struct TurnState {
    vad: Box<dyn VadStream>,
    model_tx: mpsc::Sender<RealtimeClientEvent>,
    model_task: JoinHandle<()>,
    stt_tx: Option<mpsc::Sender<AudioFrame>>,
    output: mpsc::Sender<RoomOutput>,
    speech_tx: mpsc::Sender<String>,
    speech_task: JoinHandle<()>,
    /// Final user transcript of the current turn.
    transcript: String,
    user_speaking: bool,
    agent_speaking: bool,
    speech_ended_at: Option<Instant>,
    end_of_turn: Option<Instant>,
}

/// Whether the loop should keep running after handling an event.
type Flow = Result<bool, AgentError>;

impl Activity {
    pub(crate) fn new(
        components: Components,
        tools: ToolSet,
        connection: RealtimeConnection,
        stt: SttStream,
        room: Room,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        let room_name = room.name().to_string();
        let Room {
            audio_in, output, ..
        } = room;
        let (speech_tx, speech_rx) = mpsc::channel(SPEECH_QUEUE);
        let speech_task = tokio::spawn(
            speak_replies(components.tts.clone(), speech_rx, output.clone()).in_current_span(),
        );
        let turn = TurnState {
            vad: components.vad.stream(),
            model_tx: connection.tx,
            model_task: connection.task,
            stt_tx: Some(stt.audio_tx),
            output,
            speech_tx,
            speech_task,
            transcript: String::new(),
            user_speaking: false,
            agent_speaking: false,
            speech_ended_at: None,
            end_of_turn: None,
        };
        Self {
            components,
            tools: Arc::new(tools),
            room_name,
            audio_in,
            model_events: connection.events,
            stt_events: stt.events,
            turn,
            state_tx,
        }
    }

    pub(crate) async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<(), AgentError> {
        let Activity {
            components,
            tools,
            room_name,
            mut audio_in,
            mut model_events,
            mut stt_events,
            mut turn,
            state_tx,
        } = self;
        let mut tool_calls: JoinSet<Vec<ToolResult>> = JoinSet::new();

        let result = loop {
            let deadline = turn.end_of_turn;
            let flow = tokio::select! {
                _ = &mut shutdown => {
                    info!(room = %room_name, "Session closed by host.");
                    Ok(false)
                }
                frame = audio_in.recv() => match frame {
                    Some(frame) => turn.on_audio(frame, &components).await,
                    None => {
                        info!(room = %room_name, "Participant left the room.");
                        Ok(false)
                    }
                },
                Some(event) = model_events.recv() => {
                    turn.on_model_event(event, &tools, &mut tool_calls).await
                },
                Some(done) = tool_calls.join_next(), if !tool_calls.is_empty() => match done {
                    Ok(results) => turn
                        .send_model(RealtimeClientEvent::ToolResponses(results))
                        .await
                        .map(|()| true),
                    Err(e) => {
                        warn!(error = %e, "Tool call task did not complete");
                        Ok(true)
                    }
                },
                Some(speech) = stt_events.recv() => turn.on_transcript(speech, &components).await,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    turn.end_user_turn().await
                }
            };
            match flow {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Dropping the senders ends the STT stream; aborting the model task
        // cancels any reply still being generated.
        tool_calls.abort_all();
        turn.speech_task.abort();
        turn.stt_tx.take();
        turn.model_task.abort();
        state_tx.send_replace(SessionState::Closed);
        info!(room = %room_name, "Session closed and components released.");
        result
    }
}

/// Synthesizes text replies in arrival order and plays them into the room.
async fn speak_replies(
    tts: Arc<dyn TextToSpeech>,
    mut text_rx: mpsc::Receiver<String>,
    output: mpsc::Sender<RoomOutput>,
) {
    while let Some(text) = text_rx.recv().await {
        match tts.synthesize(&text).await {
            Ok(frames) => {
                for frame in frames {
                    if output.send(RoomOutput::Audio(frame)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Text-to-speech failed; reply dropped"),
        }
    }
}

impl TurnState {
    async fn on_audio(&mut self, frame: AudioFrame, components: &Components) -> Flow {
        match self.vad.push_frame(&frame) {
            Some(VadEvent::StartOfSpeech) => {
                debug!("User started speaking");
                self.user_speaking = true;
                self.speech_ended_at = None;
                self.end_of_turn = None;
                self.send_model(RealtimeClientEvent::ActivityStart).await?;
                if self.agent_speaking {
                    self.agent_speaking = false;
                    if !self.emit(RoomOutput::ClearAudio).await {
                        return Ok(false);
                    }
                }
            }
            Some(VadEvent::EndOfSpeech) => {
                debug!("User stopped speaking");
                self.user_speaking = false;
                self.speech_ended_at = Some(Instant::now());
                self.schedule_end_of_turn(components);
            }
            None => {}
        }

        let stt_gone = match &self.stt_tx {
            Some(stt_tx) => stt_tx.send(frame.clone()).await.is_err(),
            None => false,
        };
        if stt_gone {
            warn!("Speech-to-text stream ended; continuing without transcripts.");
            self.stt_tx = None;
        }
        self.send_model(RealtimeClientEvent::Audio(frame)).await?;
        Ok(true)
    }

    async fn on_transcript(&mut self, speech: SpeechEvent, components: &Components) -> Flow {
        if speech.is_final && !speech.text.trim().is_empty() {
            if !self.transcript.is_empty() {
                self.transcript.push(' ');
            }
            self.transcript.push_str(speech.text.trim());
            // A late final transcript can change how long we should wait.
            if !self.user_speaking && self.speech_ended_at.is_some() {
                self.schedule_end_of_turn(components);
            }
        }
        Ok(self
            .emit(RoomOutput::Transcript {
                speaker: Speaker::User,
                text: speech.text,
                is_final: speech.is_final,
            })
            .await)
    }

    async fn on_model_event(
        &mut self,
        event: GenericServerEvent,
        tools: &Arc<ToolSet>,
        tool_calls: &mut JoinSet<Vec<ToolResult>>,
    ) -> Flow {
        match event {
            GenericServerEvent::AudioChunk(frame) => {
                self.agent_speaking = true;
                return Ok(self.emit(RoomOutput::Audio(frame)).await);
            }
            GenericServerEvent::Text(text) => {
                self.agent_speaking = true;
                match self.speech_tx.try_send(text) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Speech queue is full; reply dropped");
                    }
                    Err(TrySendError::Closed(_)) => return Ok(false),
                }
            }
            GenericServerEvent::Transcription { text, is_final } => {
                return Ok(self
                    .emit(RoomOutput::Transcript {
                        speaker: Speaker::Agent,
                        text,
                        is_final,
                    })
                    .await);
            }
            GenericServerEvent::Speaking => self.agent_speaking = true,
            GenericServerEvent::SpeakingDone => self.agent_speaking = false,
            GenericServerEvent::Interrupted => {
                self.agent_speaking = false;
                return Ok(self.emit(RoomOutput::ClearAudio).await);
            }
            GenericServerEvent::ToolCalls(calls) => {
                let tools = tools.clone();
                tool_calls.spawn(
                    async move {
                        let mut results = Vec::with_capacity(calls.len());
                        for call in calls {
                            results.push(tools.dispatch(call).await);
                        }
                        results
                    }
                    .in_current_span(),
                );
            }
            GenericServerEvent::Error(message) => {
                warn!(error = %message, "Realtime model reported an error");
            }
            GenericServerEvent::Closed => {
                warn!("Realtime model connection closed.");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn end_user_turn(&mut self) -> Flow {
        info!(transcript = %self.transcript, "User turn complete");
        self.end_of_turn = None;
        self.speech_ended_at = None;
        self.transcript.clear();
        self.send_model(RealtimeClientEvent::ActivityEnd).await?;
        Ok(true)
    }

    fn schedule_end_of_turn(&mut self, components: &Components) {
        if let Some(ended_at) = self.speech_ended_at {
            let delay = components.turn_detector.endpointing_delay(&self.transcript);
            self.end_of_turn = Some(ended_at + delay);
        }
    }

    async fn send_model(&self, event: RealtimeClientEvent) -> Result<(), AgentError> {
        self.model_tx.send(event).await.map_err(|_| {
            AgentError::component("llm", "realtime model connection is gone")
        })
    }

    /// Returns false once the participant stopped listening.
    async fn emit(&self, output: RoomOutput) -> bool {
        self.output.send(output).await.is_ok()
    }
}
