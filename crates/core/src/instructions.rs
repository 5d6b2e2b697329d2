//! Step-scoped instruction payloads for the voice tutor.
//!
//! A template with `{placeholder}` markers is filled from the active
//! [`FlattenedStep`]. The compiled-in default can be replaced by a prompt file.

use crate::{outline::StepKind, steps::FlattenedStep};
use std::fmt::Write;

pub const DEFAULT_LEARNER_NAME: &str = "Student";

pub const DEFAULT_TEMPLATE: &str = "\
You are a warm, precise beauty-industry trainer tutoring {learner} by voice.
You are on step {position} of {total} in the course.

Section: {section}
Lesson: {lesson}
Step: {step_title} ({step_kind})

What the learner sees:
{description}
{media}
Author guidance for this step:
{prompt}
{quiz}
Stay strictly on this step. Keep answers short and conversational, check
understanding with a question now and then, and never reveal quiz answers.";

#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    template: String,
    learner_name: String,
}

impl Default for InstructionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE.to_string(), None)
    }
}

impl InstructionBuilder {
    /// Blank or missing learner names fall back to [`DEFAULT_LEARNER_NAME`].
    pub fn new(template: String, learner_name: Option<String>) -> Self {
        let learner_name = learner_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_LEARNER_NAME.to_string());
        Self {
            template,
            learner_name,
        }
    }

    pub fn learner_name(&self) -> &str {
        &self.learner_name
    }

    pub fn with_learner_name(self, learner_name: Option<String>) -> Self {
        Self::new(self.template, learner_name)
    }

    pub fn build(&self, step: &FlattenedStep, total_steps: usize) -> String {
        let source = &step.source_step;
        let description = if source.description.trim().is_empty() {
            "(no description)".to_string()
        } else {
            source.description.trim().to_string()
        };
        let media = source
            .media_url
            .as_deref()
            .map(|url| format!("Media shown: {url}\n"))
            .unwrap_or_default();
        let prompt = source
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("Explain the step and answer questions about it.");

        let position = step.global_index.to_string();
        let total = total_steps.to_string();
        let quiz = quiz_section(step);
        fill_placeholders(&self.template, |name| match name {
            "learner" => Some(self.learner_name.as_str()),
            "position" => Some(position.as_str()),
            "total" => Some(total.as_str()),
            "section" => Some(step.section_label.as_str()),
            "lesson" => Some(step.lesson_label.as_str()),
            "step_title" => Some(source.title.as_str()),
            "step_kind" => Some(source.kind.as_str()),
            "description" => Some(description.as_str()),
            "media" => Some(media.as_str()),
            "prompt" => Some(prompt),
            "quiz" => Some(quiz.as_str()),
            _ => None,
        })
    }
}

/// Substitutes `{name}` markers in one pass, so substituted text is never
/// scanned again. Unknown markers are kept as written.
fn fill_placeholders<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| Some((close, value(&after[..close])?))) {
            Some((close, replacement)) => {
                out.push_str(replacement);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Lists the questions without their answers so the tutor can coach, not tell.
fn quiz_section(step: &FlattenedStep) -> String {
    let source = &step.source_step;
    if source.kind != StepKind::Quiz || source.questions.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nThe learner must score 90% on these questions:\n");
    for (n, question) in source.questions.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", n + 1, question.question);
        for option in &question.options {
            let _ = writeln!(out, "   - {option}");
        }
    }
    out
}
