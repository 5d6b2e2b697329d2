//! Step Flattener
//!
//! Derives the strictly ordered, globally numbered sequence of atomic steps
//! from a nested [`CourseOutline`]. The result is a pure function of the
//! outline and must be recomputed whenever a different outline is supplied.

use crate::outline::{CourseOutline, Step};
use serde::Serialize;

/// One atomic learning step with its position across the whole course.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedStep {
    /// 1-based, contiguous position across every section and lesson.
    pub global_index: usize,
    pub source_step: Step,
    pub section_label: String,
    pub lesson_label: String,
    pub is_last: bool,
}

/// Walks the outline in tree order and numbers every step.
pub fn flatten(outline: &CourseOutline) -> Vec<FlattenedStep> {
    let mut flat: Vec<FlattenedStep> = outline
        .sections
        .iter()
        .flat_map(|section| {
            section.lessons.iter().flat_map(move |lesson| {
                lesson.steps.iter().map(move |step| (section, lesson, step))
            })
        })
        .enumerate()
        .map(|(position, (section, lesson, step))| FlattenedStep {
            global_index: position + 1,
            source_step: step.clone(),
            section_label: section.title.clone(),
            lesson_label: lesson.title.clone(),
            is_last: false,
        })
        .collect();

    if let Some(last) = flat.last_mut() {
        last.is_last = true;
    }
    flat
}

/// The flattened steps of one outline snapshot, addressed by global index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepList {
    steps: Vec<FlattenedStep>,
}

impl StepList {
    pub fn from_outline(outline: &CourseOutline) -> Self {
        Self {
            steps: flatten(outline),
        }
    }

    /// Looks up a step by its 1-based global index.
    pub fn get(&self, global_index: usize) -> Option<&FlattenedStep> {
        global_index
            .checked_sub(1)
            .and_then(|position| self.steps.get(position))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first_index(&self) -> Option<usize> {
        self.steps.first().map(|s| s.global_index)
    }

    /// Clamps an index into `[1, len]`, or `None` for an empty course.
    pub fn clamp_index(&self, global_index: usize) -> Option<usize> {
        if self.steps.is_empty() {
            None
        } else {
            Some(global_index.clamp(1, self.steps.len()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlattenedStep> {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{Lesson, QuizQuestion, Section, StepKind};

    fn step(id: &str, kind: StepKind) -> Step {
        Step {
            id: id.to_string(),
            title: format!("Step {id}"),
            kind,
            description: String::new(),
            media_url: None,
            prompt: None,
            questions: if kind == StepKind::Quiz {
                vec![QuizQuestion {
                    id: format!("{id}-q1"),
                    question: "?".into(),
                    options: vec!["a".into(), "b".into()],
                    correct_index: 0,
                }]
            } else {
                vec![]
            },
        }
    }

    /// 2 sections × 2 lessons × (one lecture, one quiz).
    fn two_by_two_outline() -> CourseOutline {
        let sections = (1..=2)
            .map(|s| Section {
                title: format!("Section {s}"),
                lessons: (1..=2)
                    .map(|l| Lesson {
                        title: format!("Lesson {s}.{l}"),
                        steps: vec![
                            step(&format!("{s}.{l}.a"), StepKind::Lecture),
                            step(&format!("{s}.{l}.b"), StepKind::Quiz),
                        ],
                    })
                    .collect(),
            })
            .collect();
        CourseOutline {
            title: "Brows".into(),
            sections,
        }
    }

    fn assert_well_formed(flat: &[FlattenedStep]) {
        for (position, s) in flat.iter().enumerate() {
            assert_eq!(s.global_index, position + 1);
        }
        let last_count = flat.iter().filter(|s| s.is_last).count();
        if flat.is_empty() {
            assert_eq!(last_count, 0);
        } else {
            assert_eq!(last_count, 1);
            assert!(flat[flat.len() - 1].is_last);
        }
    }

    #[test]
    fn test_two_by_two_by_two_outline() {
        let flat = flatten(&two_by_two_outline());

        assert_eq!(flat.len(), 8);
        assert_well_formed(&flat);
        assert_eq!(flat[0].section_label, "Section 1");
        assert_eq!(flat[0].lesson_label, "Lesson 1.1");
        assert_eq!(flat[0].source_step.id, "1.1.a");
        assert_eq!(flat[5].lesson_label, "Lesson 2.1");
        assert_eq!(flat[5].source_step.id, "2.1.b");
        assert!(flat[7].is_last);
        assert!(flat[..7].iter().all(|s| !s.is_last));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let outline = two_by_two_outline();
        assert_eq!(flatten(&outline), flatten(&outline));
    }

    #[test]
    fn test_empty_lessons_and_sections_are_skipped() {
        let outline = CourseOutline {
            title: String::new(),
            sections: vec![
                Section {
                    title: "Empty".into(),
                    lessons: vec![],
                },
                Section {
                    title: "Sparse".into(),
                    lessons: vec![
                        Lesson {
                            title: "Nothing yet".into(),
                            steps: vec![],
                        },
                        Lesson {
                            title: "Only one".into(),
                            steps: vec![step("only", StepKind::Interaction)],
                        },
                    ],
                },
            ],
        };

        let flat = flatten(&outline);
        assert_eq!(flat.len(), 1);
        assert_well_formed(&flat);
        assert_eq!(flat[0].section_label, "Sparse");
        assert_eq!(flat[0].lesson_label, "Only one");
    }

    #[test]
    fn test_empty_outline_yields_empty_sequence() {
        let flat = flatten(&CourseOutline::default());
        assert!(flat.is_empty());

        let list = StepList::from_outline(&CourseOutline::default());
        assert!(list.is_empty());
        assert_eq!(list.first_index(), None);
        assert_eq!(list.clamp_index(3), None);
    }

    #[test]
    fn test_reordering_renumbers_everything() {
        let mut outline = two_by_two_outline();
        outline.sections.swap(0, 1);

        let flat = flatten(&outline);
        assert_well_formed(&flat);
        assert_eq!(flat[0].source_step.id, "2.1.a");
        assert_eq!(flat[7].source_step.id, "1.2.b");
    }

    #[test]
    fn test_step_list_lookup() {
        let list = StepList::from_outline(&two_by_two_outline());

        assert_eq!(list.len(), 8);
        assert!(list.get(0).is_none());
        assert_eq!(list.get(1).map(|s| s.source_step.id.as_str()), Some("1.1.a"));
        assert_eq!(list.get(8).map(|s| s.is_last), Some(true));
        assert!(list.get(9).is_none());
        assert_eq!(list.clamp_index(0), Some(1));
        assert_eq!(list.clamp_index(42), Some(8));
        assert_eq!(list.iter().count(), 8);
    }
}
