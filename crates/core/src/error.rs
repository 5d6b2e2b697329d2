use crate::gate::GateState;

/// Errors surfaced by the tutoring core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TutorError {
    #[error("Audio capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("Realtime transport rejected the session: {0}")]
    TransportRejected(String),
    #[error("Audio chunk could not be decoded: {0}")]
    DecodeFailure(String),
    #[error("Cannot advance past step {0} until its quiz is passed")]
    GateViolation(usize),
    #[error("Step {index} is out of range (course has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },
    #[error("Quiz is not awaiting answers (state: {0:?})")]
    QuizNotPending(GateState),
}

impl TutorError {
    /// Capture and transport failures end the session but the learner may retry.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            TutorError::CaptureUnavailable(_) | TutorError::TransportRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TutorError::CaptureUnavailable("permission denied".into()).to_string(),
            "Audio capture unavailable: permission denied"
        );
        assert_eq!(
            TutorError::StepOutOfRange { index: 9, len: 8 }.to_string(),
            "Step 9 is out of range (course has 8 steps)"
        );
    }

    #[test]
    fn test_session_terminal_errors() {
        assert!(TutorError::CaptureUnavailable(String::new()).is_session_terminal());
        assert!(TutorError::TransportRejected(String::new()).is_session_terminal());
        assert!(!TutorError::DecodeFailure(String::new()).is_session_terminal());
        assert!(!TutorError::GateViolation(3).is_session_terminal());
    }
}
