use anyhow::Result;
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::db::types::{AssessmentKind, FinalizeMode, QuestionKindTag, SubmissionStatus};
use crate::schemas::assessment::{AnswerOption, Assessment, Question, QuestionKind};
use crate::schemas::submission::{AnswerRecord, Submission};

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentRow {
    pub id: String,
    pub title: String,
    pub kind: AssessmentKind,
    pub duration_minutes: Option<i32>,
    pub total_points: f64,
    pub passing_points: f64,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub max_attempts: Option<i32>,
    pub show_results_immediately: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<AssessmentRow> for Assessment {
    fn from(row: AssessmentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            kind: row.kind,
            duration_minutes: row.duration_minutes,
            total_points: row.total_points,
            passing_points: row.passing_points,
            start_time: row.start_time,
            end_time: row.end_time,
            max_attempts: row.max_attempts,
            show_results_immediately: row.show_results_immediately,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: String,
    pub assessment_id: String,
    pub kind: QuestionKindTag,
    pub prompt: String,
    pub points: f64,
    pub order_index: i32,
    pub model_answer: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionOptionRow {
    pub id: String,
    pub question_id: String,
    pub label: String,
    pub is_correct: bool,
    pub order_index: i32,
}

impl QuestionRow {
    /// Joins the row with its options; options of other questions are ignored.
    pub fn into_question(self, options: &[QuestionOptionRow]) -> Result<Question> {
        let mut own: Vec<&QuestionOptionRow> =
            options.iter().filter(|option| option.question_id == self.id).collect();
        own.sort_by_key(|option| option.order_index);
        let own: Vec<AnswerOption> = own
            .into_iter()
            .map(|option| AnswerOption {
                id: option.id.clone(),
                label: option.label.clone(),
                is_correct: option.is_correct,
            })
            .collect();

        let kind = match self.kind {
            QuestionKindTag::MultipleChoice => QuestionKind::MultipleChoice { options: own },
            QuestionKindTag::TrueFalse => QuestionKind::TrueFalse { options: own },
            QuestionKindTag::ShortAnswer => QuestionKind::ShortAnswer {
                model_answer: self.model_answer.filter(|answer| !answer.trim().is_empty()),
            },
            QuestionKindTag::Essay => QuestionKind::Essay,
        };

        let question = Question {
            id: self.id,
            assessment_id: self.assessment_id,
            prompt: self.prompt,
            points: self.points,
            order_index: self.order_index,
            kind,
        };
        question.check_shape()?;
        Ok(question)
    }
}

pub fn question_kind_tag(kind: &QuestionKind) -> QuestionKindTag {
    match kind {
        QuestionKind::MultipleChoice { .. } => QuestionKindTag::MultipleChoice,
        QuestionKind::TrueFalse { .. } => QuestionKindTag::TrueFalse,
        QuestionKind::ShortAnswer { .. } => QuestionKindTag::ShortAnswer,
        QuestionKind::Essay => QuestionKindTag::Essay,
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRow {
    pub id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub attempt_number: i32,
    pub status: SubmissionStatus,
    pub answers: Json<Vec<AnswerRecord>>,
    pub started_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub submitted_at: Option<OffsetDateTime>,
    pub graded_at: Option<OffsetDateTime>,
    pub obtained_points: f64,
    pub total_points: f64,
    pub percentage: f64,
    pub provisional: bool,
    pub passed: Option<bool>,
    pub feedback: Option<String>,
    pub finalize_mode: Option<FinalizeMode>,
    pub results_released_at: Option<OffsetDateTime>,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<SubmissionRow> for Submission {
    fn from(row: SubmissionRow) -> Self {
        Self {
            id: row.id,
            assessment_id: row.assessment_id,
            student_id: row.student_id,
            attempt_number: row.attempt_number,
            status: row.status,
            answers: row.answers.0,
            started_at: row.started_at,
            expires_at: row.expires_at,
            submitted_at: row.submitted_at,
            graded_at: row.graded_at,
            obtained_points: row.obtained_points,
            total_points: row.total_points,
            percentage: row.percentage,
            provisional: row.provisional,
            passed: row.passed,
            feedback: row.feedback,
            finalize_mode: row.finalize_mode,
            results_released_at: row.results_released_at,
            version: row.version,
        }
    }
}
