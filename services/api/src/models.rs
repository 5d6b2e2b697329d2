//! API Models
//!
//! Learner-facing views of flattened steps, shared by the REST catalog and the
//! WebSocket state updates, with `utoipa` schemas for the OpenAPI document.
//! Correct answers never leave the server.

use serde::Serialize;
use tutor_core::{outline::QuizQuestion, steps::FlattenedStep};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct QuestionView {
    #[schema(example = "q1")]
    pub id: String,
    #[schema(example = "Which tool lifts the lash?")]
    pub question: String,
    pub options: Vec<String>,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(question: &QuizQuestion) -> Self {
        Self {
            id: question.id.clone(),
            question: question.question.clone(),
            options: question.options.clone(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct StepView {
    /// 1-based position across the whole course.
    #[schema(example = 3)]
    pub global_index: usize,
    pub id: String,
    #[schema(example = "Mixing the tint")]
    pub title: String,
    /// One of `lecture`, `quiz` or `interaction`.
    #[schema(example = "quiz")]
    pub kind: String,
    pub section_label: String,
    pub lesson_label: String,
    pub description: String,
    pub media_url: Option<String>,
    pub is_last: bool,
    pub questions: Vec<QuestionView>,
}

impl From<&FlattenedStep> for StepView {
    fn from(step: &FlattenedStep) -> Self {
        let source = &step.source_step;
        Self {
            global_index: step.global_index,
            id: source.id.clone(),
            title: source.title.clone(),
            kind: source.kind.as_str().to_string(),
            section_label: step.section_label.clone(),
            lesson_label: step.lesson_label.clone(),
            description: source.description.clone(),
            media_url: source.media_url.clone(),
            is_last: step.is_last,
            questions: source.questions.iter().map(QuestionView::from).collect(),
        }
    }
}

/// Course catalog returned by `GET /steps`.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct StepCatalog {
    pub title: String,
    pub total_steps: usize,
    pub steps: Vec<StepView>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
