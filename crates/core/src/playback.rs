//! Gap-free scheduling of synthesized speech on a monotonic timeline.
//!
//! Each buffer starts at `max(now, previous_end)` and pushes the cursor forward
//! by its own duration, so sequential chunks neither overlap nor leave gaps.
//! An interruption discards the backlog and resets the cursor to zero.

use std::collections::VecDeque;

/// Where a buffer sits on the playback timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSpan {
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledSpan {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// A decoded buffer ready to be handed to an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub span: ScheduledSpan,
}

/// The local output device (speaker, or a remote UI acting as one).
pub trait PlaybackSink: Send {
    /// Current position of the sink's clock, in seconds.
    fn now(&self) -> f64;
    fn play(&mut self, buffer: PlaybackBuffer);
    /// Silences everything that was scheduled but has not finished playing.
    fn stop_all(&mut self);
}

#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    cursor: f64,
    scheduled: VecDeque<ScheduledSpan>,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            cursor: 0.0,
            scheduled: VecDeque::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Timeline offset at which the next buffer would start, ignoring `now`.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Places a buffer of `sample_count` samples after everything already queued.
    pub fn schedule(&mut self, now: f64, sample_count: usize) -> ScheduledSpan {
        self.scheduled.retain(|span| span.end() > now);

        let duration = sample_count as f64 / self.sample_rate as f64;
        let start_at = now.max(self.cursor);
        self.cursor = start_at + duration;

        let span = ScheduledSpan { start_at, duration };
        self.scheduled.push_back(span);
        span
    }

    /// Seconds of audio queued past `now`.
    pub fn backlog(&self, now: f64) -> f64 {
        (self.cursor - now).max(0.0)
    }

    /// Drops all queued spans and rewinds the cursor; returns how many were dropped.
    pub fn interrupt(&mut self) -> usize {
        let discarded = self.scheduled.len();
        self.scheduled.clear();
        self.cursor = 0.0;
        discarded
    }
}
