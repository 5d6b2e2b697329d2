//! Turn-based transcript of a tutoring session.
//!
//! Streamed fragments are collected into an explicit open turn and only
//! written to the log when the speaker changes or the turn is ended.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    log: Vec<TranscriptEntry>,
    current_turn: Option<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a streamed fragment, starting a new turn on speaker change.
    pub fn push_fragment(&mut self, speaker: Speaker, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        match self.current_turn.as_mut() {
            Some(turn) if turn.speaker == speaker => turn.text.push_str(fragment),
            _ => {
                self.end_turn();
                self.current_turn = Some(TranscriptEntry {
                    speaker,
                    text: fragment.to_string(),
                });
            }
        }
    }

    /// Flushes the open turn, if any, to the log.
    pub fn end_turn(&mut self) {
        if let Some(turn) = self.current_turn.take() {
            self.log.push(turn);
        }
    }

    pub fn current_speaker(&self) -> Option<Speaker> {
        self.current_turn.as_ref().map(|t| t.speaker)
    }

    /// Completed turns only.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.log
    }

    /// Completed turns followed by the open turn, for rendering.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.log
            .iter()
            .chain(self.current_turn.as_ref())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.current_turn.is_none()
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.current_turn = None;
    }
}
