//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Text frames carry the JSON messages below. Binary frames from the client
//! carry raw microphone samples as little-endian `f32`.

use crate::controller::TutorSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tutor_core::outline::CourseOutline;
use uuid::Uuid;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicrophoneInfo {
    pub sample_rate: u32,
}

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identifies the learner. This must be the first message.
    Init {
        learner_name: Option<String>,
        /// Present once the learner has granted microphone access.
        microphone: Option<MicrophoneInfo>,
    },
    /// Replaces the course outline for this connection.
    SetOutline { outline: CourseOutline },
    SelectStep { index: usize },
    NextStep,
    PrevStep,
    JumpTo { index: usize },
    StartSession,
    StopSession,
    SelectAnswer { question_id: String, option: usize },
    SubmitQuiz {
        #[serde(default)]
        answers: HashMap<String, usize>,
    },
    RetryQuiz,
    /// Microphone permission changed. `None` revokes access.
    Microphone { sample_rate: Option<u32> },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Initialized {
        connection_id: Uuid,
        learner_name: String,
        state: TutorSnapshot,
    },
    /// The full observable state after any change.
    StateUpdate { state: TutorSnapshot },
    /// Synthesized speech (base64 PCM16 at `sample_rate`) with its slot on the playback timeline.
    AudioChunk {
        data: String,
        sample_rate: u32,
        start_at: f64,
        duration: f64,
    },
    /// Stop everything queued for playback.
    PlaybackInterrupted,
    Error { message: String, recoverable: bool },
}
