//! Progress/Gate State Machine
//!
//! Tracks the quiz attempt for the active step and decides whether the learner
//! may advance. Quiz state never survives a step change: entering any step
//! starts from a clean attempt.

use crate::{
    error::TutorError,
    outline::{QuizQuestion, Step},
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Minimum score, in percent, required to pass a quiz step.
pub const PASS_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateState {
    LectureViewing,
    QuizPending,
    QuizSubmittedPass,
    QuizSubmittedFail,
}

/// Answers and grading for the quiz of the active step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    /// Question id → selected option index.
    pub answers: HashMap<String, usize>,
    pub submitted: bool,
    pub score_percent: Option<f64>,
}

/// Result of grading a submitted attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizOutcome {
    pub correct: usize,
    pub total: usize,
    pub score_percent: f64,
    pub passed: bool,
}

/// Computes `100 * correct / total`. Unanswered questions and out-of-range
/// option indices count as incorrect.
pub fn grade(questions: &[QuizQuestion], answers: &HashMap<String, usize>) -> QuizOutcome {
    let total = questions.len();
    let correct = questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_index))
        .count();
    let score_percent = if total == 0 {
        100.0
    } else {
        100.0 * correct as f64 / total as f64
    };
    QuizOutcome {
        correct,
        total,
        score_percent,
        passed: score_percent >= PASS_THRESHOLD_PERCENT,
    }
}

#[derive(Debug, Clone)]
pub struct ProgressGate {
    state: GateState,
    step_index: Option<usize>,
    questions: Vec<QuizQuestion>,
    attempt: QuizAttempt,
}

impl Default for ProgressGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressGate {
    /// A gate with no step entered behaves like a lecture: nothing blocks.
    pub fn new() -> Self {
        Self {
            state: GateState::LectureViewing,
            step_index: None,
            questions: Vec::new(),
            attempt: QuizAttempt::default(),
        }
    }

    /// Resets all quiz-local state for a newly entered step.
    pub fn enter(&mut self, global_index: usize, step: &Step) {
        self.step_index = Some(global_index);
        self.attempt = QuizAttempt::default();
        if step.has_gated_quiz() {
            self.questions = step.questions.clone();
            self.state = GateState::QuizPending;
        } else {
            self.questions.clear();
            self.state = GateState::LectureViewing;
        }
        debug!(step = global_index, state = ?self.state, "Entered step");
    }

    /// Forgets the current step entirely (used when the course becomes empty).
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn attempt(&self) -> &QuizAttempt {
        &self.attempt
    }

    pub fn can_advance(&self) -> bool {
        matches!(
            self.state,
            GateState::LectureViewing | GateState::QuizSubmittedPass
        )
    }

    /// Returns `GateViolation` when "next" must stay disabled.
    pub fn ensure_can_advance(&self) -> Result<(), TutorError> {
        if self.can_advance() {
            Ok(())
        } else {
            Err(TutorError::GateViolation(self.step_index.unwrap_or_default()))
        }
    }

    /// Records a single answer while the quiz is still open.
    pub fn select_answer(&mut self, question_id: &str, option: usize) -> Result<(), TutorError> {
        self.require_pending()?;
        self.attempt.answers.insert(question_id.to_string(), option);
        Ok(())
    }

    /// Merges `answers` into the attempt and grades it.
    pub fn submit(&mut self, answers: HashMap<String, usize>) -> Result<QuizOutcome, TutorError> {
        self.require_pending()?;
        self.attempt.answers.extend(answers);

        let outcome = grade(&self.questions, &self.attempt.answers);
        self.attempt.submitted = true;
        self.attempt.score_percent = Some(outcome.score_percent);
        self.state = if outcome.passed {
            GateState::QuizSubmittedPass
        } else {
            GateState::QuizSubmittedFail
        };

        info!(
            step = ?self.step_index,
            correct = outcome.correct,
            total = outcome.total,
            score = outcome.score_percent,
            passed = outcome.passed,
            "Quiz graded"
        );
        Ok(outcome)
    }

    /// Clears a failed attempt so the learner can answer again.
    pub fn retry(&mut self) -> Result<(), TutorError> {
        if self.state != GateState::QuizSubmittedFail {
            return Err(TutorError::QuizNotPending(self.state));
        }
        self.attempt = QuizAttempt::default();
        self.state = GateState::QuizPending;
        Ok(())
    }

    fn require_pending(&self) -> Result<(), TutorError> {
        if self.state == GateState::QuizPending {
            Ok(())
        } else {
            Err(TutorError::QuizNotPending(self.state))
        }
    }
}
