use crate::{
    audio::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE},
    transcript::Speaker,
};

/// Output channels requested from the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Audio,
}

/// PCM16 sample rates for each direction of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            input_sample_rate: CAPTURE_SAMPLE_RATE,
            output_sample_rate: PLAYBACK_SAMPLE_RATE,
        }
    }
}

/// Everything a provider needs to open a step-scoped session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub instructions: String,
    pub audio_format: AudioFormat,
    pub output_modalities: Vec<Modality>,
}

impl SessionSetup {
    /// A voice session: PCM16 both ways, speech out.
    pub fn voice(instructions: String) -> Self {
        Self {
            instructions,
            audio_format: AudioFormat::default(),
            output_modalities: vec![Modality::Audio],
        }
    }
}

/// Provider-agnostic events emitted by a realtime transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote side accepted the session; audio may now flow.
    Opened,
    /// A transcript fragment for the given speaker.
    Transcript { speaker: Speaker, text: String },
    /// A chunk of synthesized speech (base64 encoded PCM16).
    AudioChunk(String),
    /// The learner started speaking over queued assistant audio.
    Interrupted,
    /// The assistant finished its turn.
    TurnComplete,
    /// The connection was closed by the remote side.
    Closed { reason: Option<String> },
    /// An error from the provider.
    Error(String),
}
