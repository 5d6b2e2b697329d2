//! Inbound half of the audio codec bridge: decodes synthesized speech and
//! queues it back-to-back on the playback sink.

use tracing::{debug, warn};
use tutor_core::{
    audio::{PLAYBACK_SAMPLE_RATE, decode_base64_i16_to_f32},
    playback::{PlaybackBuffer, PlaybackScheduler, PlaybackSink, ScheduledSpan},
};

pub struct AudioBridge {
    scheduler: PlaybackScheduler,
    sink: Box<dyn PlaybackSink>,
    dropped_chunks: u64,
}

impl AudioBridge {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE),
            sink,
            dropped_chunks: 0,
        }
    }

    /// Decodes one base64 PCM16 chunk and schedules it after the current backlog.
    ///
    /// A chunk that fails to decode is skipped; the session carries on.
    pub fn on_chunk(&mut self, data: &str) -> Option<ScheduledSpan> {
        let samples = match decode_base64_i16_to_f32(data) {
            Ok(samples) => samples,
            Err(e) => {
                self.dropped_chunks += 1;
                warn!(error = %e, dropped = self.dropped_chunks, "Skipping undecodable audio chunk.");
                return None;
            }
        };
        let span = self.scheduler.schedule(self.sink.now(), samples.len());
        self.sink.play(PlaybackBuffer {
            samples,
            sample_rate: self.scheduler.sample_rate(),
            span,
        });
        Some(span)
    }

    /// Barge-in: silences queued speech and rewinds the timeline.
    pub fn interrupt(&mut self) {
        let discarded = self.scheduler.interrupt();
        self.sink.stop_all();
        debug!(discarded, "Playback interrupted.");
    }

    /// Clears playback state when the session ends. Does nothing if nothing was queued.
    pub fn reset(&mut self) {
        if self.scheduler.cursor() > 0.0 {
            self.interrupt();
        }
    }

    pub fn cursor(&self) -> f64 {
        self.scheduler.cursor()
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks
    }
}
