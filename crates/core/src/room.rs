//! A connection to one participant, reduced to audio in and events out.

use crate::audio::AudioFrame;
use tokio::sync::mpsc;

const ROOM_BUFFER: usize = 256;

/// What the session sends towards the participant.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutput {
    /// Agent speech at the output sample rate.
    Audio(AudioFrame),
    /// Stop playing any queued agent speech (the user barged in).
    ClearAudio,
    /// Transcript of user or agent speech.
    Transcript {
        speaker: Speaker,
        text: String,
        is_final: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Agent,
}

/// The session side of a connection.
///
/// The room is closed once every [`RoomHandle`] audio sender is dropped.
pub struct Room {
    name: String,
    pub(crate) audio_in: mpsc::Receiver<AudioFrame>,
    pub(crate) output: mpsc::Sender<RoomOutput>,
}

/// The participant side of a connection, driven by a transport.
pub struct RoomHandle {
    pub audio_tx: mpsc::Sender<AudioFrame>,
    pub output_rx: mpsc::Receiver<RoomOutput>,
}

impl Room {
    /// Creates a connected room/handle pair.
    pub fn pair(name: impl Into<String>) -> (Room, RoomHandle) {
        let (audio_tx, audio_in) = mpsc::channel(ROOM_BUFFER);
        let (output, output_rx) = mpsc::channel(ROOM_BUFFER);
        (
            Room {
                name: name.into(),
                audio_in,
                output,
            },
            RoomHandle {
                audio_tx,
                output_rx,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next inbound frame, or `None` once the participant has left.
    pub async fn recv_audio(&mut self) -> Option<AudioFrame> {
        self.audio_in.recv().await
    }

    /// True once the participant has left and all buffered audio was consumed.
    pub fn is_closed(&self) -> bool {
        self.audio_in.is_closed() && self.audio_in.is_empty()
    }
}
