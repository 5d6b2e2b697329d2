//! The learner's browser acting as microphone and speaker.
//!
//! Microphone samples arrive as binary WebSocket frames and are routed into
//! whichever capture stream is currently open. Scheduled playback is sent back
//! as `audio_chunk` messages carrying their slot on the playback timeline.

use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tutor_core::{
    TutorError,
    audio::{decode_f32_le_frames, encode_f32_to_base64_i16},
    playback::{PlaybackBuffer, PlaybackSink},
    realtime::{CaptureDevice, CaptureGuard, CaptureStream},
};

use super::protocol::ServerMessage;

/// Frames buffered between the socket and the forwarding task.
const FRAME_QUEUE: usize = 64;

#[derive(Default)]
struct MicState {
    /// `Some` once the learner has granted access.
    sample_rate: Option<u32>,
    sink: Option<mpsc::Sender<Vec<f32>>>,
    /// Identifies the stream that owns `sink`.
    generation: u64,
    dropped_frames: u64,
}

#[derive(Clone, Default)]
pub struct BrowserMicrophone {
    state: Arc<Mutex<MicState>>,
}

impl BrowserMicrophone {
    fn lock(&self) -> MutexGuard<'_, MicState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the permission state reported by the browser. Revoking ends any open stream.
    pub fn set_available(&self, sample_rate: Option<u32>) {
        let mut state = self.lock();
        state.sample_rate = sample_rate;
        if sample_rate.is_none() && state.sink.take().is_some() {
            info!("Microphone revoked. Capture stream closed.");
        }
    }

    pub fn is_available(&self) -> bool {
        self.lock().sample_rate.is_some()
    }

    /// Routes one binary frame into the open stream. Frames with no stream open are ignored.
    pub fn push_frame(&self, raw: &[u8]) -> Result<(), TutorError> {
        let samples = decode_f32_le_frames(raw)?;
        let mut state = self.lock();
        let Some(sink) = state.sink.as_ref() else {
            return Ok(());
        };
        if sink.try_send(samples).is_err() {
            state.dropped_frames += 1;
            debug!(dropped = state.dropped_frames, "Capture queue full. Dropping frame.");
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureDevice for BrowserMicrophone {
    async fn open(&self) -> Result<CaptureStream, TutorError> {
        let mut state = self.lock();
        let Some(sample_rate) = state.sample_rate else {
            return Err(TutorError::CaptureUnavailable(
                "microphone access has not been granted".to_string(),
            ));
        };
        let (tx, frames) = mpsc::channel(FRAME_QUEUE);
        state.generation += 1;
        state.sink = Some(tx);
        let generation = state.generation;

        let shared = self.state.clone();
        let guard = CaptureGuard::new(move || {
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if state.generation == generation {
                state.sink = None;
            }
        });
        Ok(CaptureStream {
            sample_rate,
            frames,
            guard,
        })
    }
}

/// Plays audio by handing timed chunks to the browser.
pub struct BrowserPlayback {
    epoch: Instant,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl BrowserPlayback {
    pub fn new(outbox: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            epoch: Instant::now(),
            outbox,
        }
    }
}

impl PlaybackSink for BrowserPlayback {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn play(&mut self, buffer: PlaybackBuffer) {
        let _ = self.outbox.send(ServerMessage::AudioChunk {
            data: encode_f32_to_base64_i16(&buffer.samples),
            sample_rate: buffer.sample_rate,
            start_at: buffer.span.start_at,
            duration: buffer.span.duration,
        });
    }

    fn stop_all(&mut self) {
        let _ = self.outbox.send(ServerMessage::PlaybackInterrupted);
    }
}
