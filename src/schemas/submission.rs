use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::types::{FinalizeMode, SubmissionStatus};

/// What the student handed in for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SubmittedValue {
    SelectedOption(String),
    Text(String),
    FileReference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correctness {
    Correct,
    /// Manual score strictly between zero and the question's points.
    Partial,
    Incorrect,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub value: Option<SubmittedValue>,
    /// Unset until evaluated, and for pending answers until a grader scores them.
    pub awarded_points: Option<f64>,
    pub correctness: Option<Correctness>,
    pub feedback: Option<String>,
    pub graded_by: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub graded_at: Option<OffsetDateTime>,
}

impl AnswerRecord {
    pub fn unanswered(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: None,
            awarded_points: None,
            correctness: None,
            feedback: None,
            graded_by: None,
            graded_at: None,
        }
    }

    pub fn answered(question_id: impl Into<String>, value: SubmittedValue) -> Self {
        Self { value: Some(value), ..Self::unanswered(question_id) }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.correctness, Some(Correctness::Pending))
    }
}

/// One student's attempt at one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub attempt_number: i32,
    pub status: SubmissionStatus,
    pub answers: Vec<AnswerRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub graded_at: Option<OffsetDateTime>,
    pub obtained_points: f64,
    pub total_points: f64,
    pub percentage: f64,
    /// True while some answers still wait for manual review.
    pub provisional: bool,
    pub passed: Option<bool>,
    pub feedback: Option<String>,
    pub finalize_mode: Option<FinalizeMode>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub results_released_at: Option<OffsetDateTime>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    pub version: i64,
}

impl Submission {
    pub fn start(
        id: impl Into<String>,
        assessment_id: impl Into<String>,
        student_id: impl Into<String>,
        attempt_number: i32,
        started_at: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            id: id.into(),
            assessment_id: assessment_id.into(),
            student_id: student_id.into(),
            attempt_number,
            status: SubmissionStatus::InProgress,
            answers: Vec::new(),
            started_at,
            expires_at,
            submitted_at: None,
            graded_at: None,
            obtained_points: 0.0,
            total_points: 0.0,
            percentage: 0.0,
            provisional: false,
            passed: None,
            feedback: None,
            finalize_mode: None,
            results_released_at: None,
            version: 0,
        }
    }

    pub fn answer(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.answers.iter().find(|record| record.question_id == question_id)
    }

    pub fn answer_mut(&mut self, question_id: &str) -> Option<&mut AnswerRecord> {
        self.answers.iter_mut().find(|record| record.question_id == question_id)
    }

    pub fn pending_count(&self) -> usize {
        self.answers.iter().filter(|record| record.is_pending()).count()
    }

    pub fn is_released(&self) -> bool {
        self.results_released_at.is_some()
    }
}

/// Percentage of `obtained` over `total`, defined as 0 for an empty assessment.
pub fn percentage_of(obtained: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    obtained * 100.0 / total
}
