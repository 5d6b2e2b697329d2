//! Tutoring controller for one learner connection.
//!
//! Ties together the flattened steps, the quiz gate, the live session, the
//! transcript and playback. Every navigation that lands on a different step
//! resets quiz state, clears the transcript and rebinds a running session.

use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};
use tutor_core::{
    TutorError,
    gate::{GateState, ProgressGate, QuizOutcome},
    generic_types::TransportEvent,
    outline::CourseOutline,
    steps::StepList,
    transcript::{Transcript, TranscriptEntry},
};
use uuid::Uuid;

use crate::{
    bridge::AudioBridge,
    lifecycle::{SessionManager, SessionSignal, SessionStatus, StartOutcome},
    models::StepView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved(usize),
    /// Already there, or at the edge of the course.
    Unchanged,
    /// The current quiz has not been passed yet.
    Blocked,
}

/// What the UI needs to redraw after handling a session signal.
#[derive(Debug, Default)]
pub struct SignalOutcome {
    pub state_changed: bool,
    pub error: Option<TutorError>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuizView {
    pub state: GateState,
    pub answers: HashMap<String, usize>,
    pub submitted: bool,
    pub score_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TutorSnapshot {
    pub course_title: String,
    pub current_step: Option<StepView>,
    pub total_steps: usize,
    pub session_status: SessionStatus,
    pub session_id: Option<Uuid>,
    pub restart_pending: bool,
    pub transcript: Vec<TranscriptEntry>,
    pub quiz: QuizView,
    pub can_advance: bool,
}

pub struct TutorController {
    outline: Arc<CourseOutline>,
    steps: StepList,
    current: Option<usize>,
    gate: ProgressGate,
    sessions: SessionManager,
    transcript: Transcript,
    bridge: AudioBridge,
}

impl TutorController {
    /// Starts on the first step, or with no current step for an empty course.
    pub fn new(outline: Arc<CourseOutline>, sessions: SessionManager, bridge: AudioBridge) -> Self {
        let steps = StepList::from_outline(&outline);
        let mut controller = Self {
            outline,
            steps,
            current: None,
            gate: ProgressGate::new(),
            sessions,
            transcript: Transcript::new(),
            bridge,
        };
        if let Some(first) = controller.steps.first_index() {
            controller.enter(first);
        }
        controller
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn can_advance(&self) -> bool {
        self.gate.can_advance()
    }

    /// Replaces the outline and re-flattens it, keeping the position when it still exists.
    pub fn set_outline(&mut self, outline: Arc<CourseOutline>) {
        if Arc::ptr_eq(&self.outline, &outline) {
            return;
        }
        self.steps = StepList::from_outline(&outline);
        self.outline = outline;
        info!(steps = self.steps.len(), "Outline replaced.");

        let target = self
            .current
            .and_then(|index| self.steps.clamp_index(index))
            .or_else(|| self.steps.first_index());
        match target {
            Some(index) => self.enter(index),
            None => {
                self.current = None;
                self.gate.clear();
                self.transcript.clear();
                self.sessions.stop();
                self.bridge.reset();
            }
        }
    }

    /// Sidebar selection: moves anywhere, regardless of the quiz gate.
    pub fn select_step(&mut self, index: usize) -> Result<NavOutcome, TutorError> {
        self.check_range(index)?;
        if self.current == Some(index) {
            return Ok(NavOutcome::Unchanged);
        }
        self.enter(index);
        Ok(NavOutcome::Moved(index))
    }

    /// Like [`select_step`](Self::select_step), but forward jumps respect the gate.
    pub fn jump_to(&mut self, index: usize) -> Result<NavOutcome, TutorError> {
        self.check_range(index)?;
        let forward = self.current.is_some_and(|current| index > current);
        if forward && !self.gate_allows_advance() {
            return Ok(NavOutcome::Blocked);
        }
        self.select_step(index)
    }

    pub fn next_step(&mut self) -> NavOutcome {
        let Some(current) = self.current else {
            return NavOutcome::Unchanged;
        };
        if !self.gate_allows_advance() {
            return NavOutcome::Blocked;
        }
        if self.steps.get(current).is_none_or(|s| s.is_last) {
            return NavOutcome::Unchanged;
        }
        self.enter(current + 1);
        NavOutcome::Moved(current + 1)
    }

    pub fn prev_step(&mut self) -> NavOutcome {
        match self.current {
            Some(current) if current > 1 => {
                self.enter(current - 1);
                NavOutcome::Moved(current - 1)
            }
            _ => NavOutcome::Unchanged,
        }
    }

    /// Starts a session bound to the current step.
    pub async fn start_session(&mut self) -> Result<StartOutcome, TutorError> {
        let Some(index) = self.current else {
            debug!("No current step. Nothing to start.");
            return Ok(StartOutcome::NoStep);
        };
        if self.sessions.restart_pending() {
            return Ok(StartOutcome::RestartPending);
        }
        let Some(step) = self.steps.get(index) else {
            return Ok(StartOutcome::NoStep);
        };
        if !self.sessions.is_live() {
            self.transcript.clear();
        }
        self.sessions.start(step, self.steps.len()).await
    }

    pub fn stop_session(&mut self) {
        self.sessions.stop();
        self.bridge.reset();
        self.transcript.end_turn();
    }

    pub fn select_answer(&mut self, question_id: &str, option: usize) -> Result<(), TutorError> {
        self.gate.select_answer(question_id, option)
    }

    pub fn submit_quiz(&mut self, answers: HashMap<String, usize>) -> Result<QuizOutcome, TutorError> {
        self.gate.submit(answers)
    }

    pub fn retry_quiz(&mut self) -> Result<(), TutorError> {
        self.gate.retry()
    }

    /// Waits for the live session (or a pending restart) to need attention.
    pub async fn next_signal(&mut self) -> SessionSignal {
        self.sessions.next_signal().await
    }

    pub async fn handle_signal(&mut self, signal: SessionSignal) -> SignalOutcome {
        match signal {
            SessionSignal::RestartDue => match self.start_session().await {
                Ok(outcome) => {
                    debug!(?outcome, "Restarted session after navigation.");
                    SignalOutcome {
                        state_changed: true,
                        error: None,
                    }
                }
                Err(e) => SignalOutcome {
                    state_changed: true,
                    error: Some(e),
                },
            },
            SessionSignal::Transport(event) => self.apply_event(event),
            SessionSignal::CaptureLost => {
                let was_live = self.sessions.is_live();
                self.stop_session();
                SignalOutcome {
                    state_changed: true,
                    error: was_live.then(|| {
                        TutorError::CaptureUnavailable(
                            "microphone stopped delivering audio".to_string(),
                        )
                    }),
                }
            }
        }
    }

    fn apply_event(&mut self, event: TransportEvent) -> SignalOutcome {
        let mut outcome = SignalOutcome {
            state_changed: true,
            error: None,
        };
        match event {
            TransportEvent::Opened => self.sessions.activate(),
            TransportEvent::Transcript { speaker, text } => {
                self.transcript.push_fragment(speaker, &text)
            }
            TransportEvent::AudioChunk(data) => {
                self.bridge.on_chunk(&data);
                outcome.state_changed = false;
            }
            TransportEvent::Interrupted => {
                self.bridge.interrupt();
                self.transcript.end_turn();
            }
            TransportEvent::TurnComplete => self.transcript.end_turn(),
            TransportEvent::Closed { reason } => {
                let reason = reason.unwrap_or_else(|| "connection closed by remote".to_string());
                outcome.error = self.end_session(reason);
            }
            TransportEvent::Error(message) => {
                outcome.error = self.end_session(message);
            }
        }
        outcome
    }

    /// Tears the session down after the remote side went away.
    fn end_session(&mut self, reason: String) -> Option<TutorError> {
        let was_live = self.sessions.is_live();
        self.stop_session();
        if was_live {
            warn!(%reason, "Session ended by transport.");
            Some(TutorError::TransportRejected(reason))
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> TutorSnapshot {
        let attempt = self.gate.attempt();
        TutorSnapshot {
            course_title: self.outline.title.clone(),
            current_step: self
                .current
                .and_then(|index| self.steps.get(index))
                .map(StepView::from),
            total_steps: self.steps.len(),
            session_status: self.sessions.status(),
            session_id: self.sessions.session_id(),
            restart_pending: self.sessions.restart_pending(),
            transcript: self.transcript.snapshot(),
            quiz: QuizView {
                state: self.gate.state(),
                answers: attempt.answers.clone(),
                submitted: attempt.submitted,
                score_percent: attempt.score_percent,
            },
            can_advance: self.gate.can_advance(),
        }
    }

    fn check_range(&self, index: usize) -> Result<(), TutorError> {
        match self.steps.get(index) {
            Some(_) => Ok(()),
            None => Err(TutorError::StepOutOfRange {
                index,
                len: self.steps.len(),
            }),
        }
    }

    fn gate_allows_advance(&self) -> bool {
        match self.gate.ensure_can_advance() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Advance blocked.");
                false
            }
        }
    }

    fn enter(&mut self, index: usize) {
        let Some(step) = self.steps.get(index) else {
            return;
        };
        self.gate.enter(index, &step.source_step);
        self.current = Some(index);
        self.transcript.clear();
        if self.sessions.rebind() {
            self.bridge.reset();
            info!(step = index, "Rebinding session to the new step.");
        }
    }
}
