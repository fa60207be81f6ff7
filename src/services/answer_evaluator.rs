//! Per-question scoring. Pure: no storage, no clock.

use crate::schemas::assessment::{Question, QuestionKind};
use crate::schemas::submission::{Correctness, SubmittedValue};

/// Decides whether a short answer matches the model answer.
pub trait ShortAnswerMatcher: Send + Sync {
    fn matches(&self, model_answer: &str, submitted: &str) -> bool;
}

/// Trimmed, case-insensitive equality.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatch;

impl ShortAnswerMatcher for ExactMatch {
    fn matches(&self, model_answer: &str, submitted: &str) -> bool {
        model_answer.trim().to_lowercase() == submitted.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub correctness: Correctness,
    /// `None` while the answer waits for a grader.
    pub awarded_points: Option<f64>,
}

impl Evaluation {
    fn correct(points: f64) -> Self {
        Self { correctness: Correctness::Correct, awarded_points: Some(points) }
    }

    fn incorrect() -> Self {
        Self { correctness: Correctness::Incorrect, awarded_points: Some(0.0) }
    }

    fn pending() -> Self {
        Self { correctness: Correctness::Pending, awarded_points: None }
    }

    pub fn needs_manual_review(&self) -> bool {
        self.correctness == Correctness::Pending
    }
}

/// Scores one answer. Missing, blank or ill-typed answers score zero; essays are always pending.
pub fn evaluate(
    question: &Question,
    answer: Option<&SubmittedValue>,
    matcher: &dyn ShortAnswerMatcher,
) -> Evaluation {
    match &question.kind {
        QuestionKind::MultipleChoice { .. } | QuestionKind::TrueFalse { .. } => {
            let Some(SubmittedValue::SelectedOption(option_id)) = answer else {
                return Evaluation::incorrect();
            };
            match question.option(option_id) {
                Some(option) if option.is_correct => Evaluation::correct(question.points),
                _ => Evaluation::incorrect(),
            }
        }
        QuestionKind::ShortAnswer { model_answer } => {
            let text = match answer {
                Some(SubmittedValue::Text(text)) if !text.trim().is_empty() => text,
                _ => return Evaluation::incorrect(),
            };
            match model_answer {
                Some(key) if matcher.matches(key, text) => Evaluation::correct(question.points),
                Some(_) => Evaluation::incorrect(),
                None => Evaluation::pending(),
            }
        }
        QuestionKind::Essay => Evaluation::pending(),
    }
}

/// Correctness label for a manual score on a question worth `max_points`.
pub fn classify_manual_score(points: f64, max_points: f64) -> Correctness {
    if points <= 0.0 {
        Correctness::Incorrect
    } else if points >= max_points {
        Correctness::Correct
    } else {
        Correctness::Partial
    }
}
