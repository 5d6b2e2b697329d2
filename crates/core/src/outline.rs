//! Course Outline Model
//!
//! The nested course outline (sections → lessons → steps) as supplied by the
//! authoring side. The tutoring core only ever reads a snapshot of it.

use serde::{Deserialize, Serialize};

/// A read-only snapshot of a course's nested structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// The kind of an atomic learning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Lecture,
    Quiz,
    Interaction,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Lecture => "lecture",
            StepKind::Quiz => "quiz",
            StepKind::Interaction => "interaction",
        }
    }
}

/// A single authored step inside a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub description: String,
    /// Video, image or document shown alongside the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Author-supplied guidance handed to the AI tutor for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

impl Step {
    /// A quiz step with no questions never blocks progress.
    pub fn has_gated_quiz(&self) -> bool {
        self.kind == StepKind::Quiz && !self.questions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}
