use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::types::AssessmentKind;

/// Gradable activity as the engine sees it; edited elsewhere, read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub title: String,
    pub kind: AssessmentKind,
    pub duration_minutes: Option<i32>,
    pub total_points: f64,
    pub passing_points: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// `None` means unlimited.
    pub max_attempts: Option<i32>,
    pub show_results_immediately: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub label: String,
    pub is_correct: bool,
}

/// Answer key per question type. Adding a type here forces every `match` on it to be revisited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    MultipleChoice { options: Vec<AnswerOption> },
    TrueFalse { options: Vec<AnswerOption> },
    ShortAnswer { model_answer: Option<String> },
    Essay,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice { .. } => "MULTIPLE_CHOICE",
            Self::TrueFalse { .. } => "TRUE_FALSE",
            Self::ShortAnswer { .. } => "SHORT_ANSWER",
            Self::Essay => "ESSAY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub assessment_id: String,
    pub prompt: String,
    pub points: f64,
    pub order_index: i32,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn option(&self, option_id: &str) -> Option<&AnswerOption> {
        match &self.kind {
            QuestionKind::MultipleChoice { options } | QuestionKind::TrueFalse { options } => {
                options.iter().find(|option| option.id == option_id)
            }
            QuestionKind::ShortAnswer { .. } | QuestionKind::Essay => None,
        }
    }

    /// Structural rules every store enforces before a question reaches the evaluator.
    pub fn check_shape(&self) -> Result<()> {
        if !self.points.is_finite() || self.points < 0.0 {
            bail!("question {} has invalid point value {}", self.id, self.points);
        }
        if let QuestionKind::TrueFalse { options } = &self.kind {
            if options.len() != 2 {
                bail!("true/false question {} has {} options, expected 2", self.id, options.len());
            }
        }
        Ok(())
    }
}
