use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::types::SubmissionStatus;
use crate::schemas::submission::{Correctness, SubmittedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerRole {
    Student,
    Instructor,
    Admin,
}

/// Caller identity, already authenticated upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub role: ViewerRole,
}

impl Viewer {
    pub fn student(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: ViewerRole::Student }
    }

    pub fn instructor(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: ViewerRole::Instructor }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, ViewerRole::Instructor | ViewerRole::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Options(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResultView {
    pub question_id: String,
    pub order_index: i32,
    pub question_type: &'static str,
    pub max_points: f64,
    pub submitted: Option<SubmittedValue>,
    pub awarded_points: Option<f64>,
    pub correctness: Option<Correctness>,
    pub feedback: Option<String>,
    pub correct_answer: Option<CorrectAnswer>,
}

/// How much of the outcome the viewer is allowed to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum ResultDetail {
    /// Submission received; no score of any kind.
    Acknowledged,
    Provisional {
        obtained_points: f64,
        total_points: f64,
        percentage: f64,
        pending_review: bool,
        /// Present only when provisional labelling is enabled.
        #[serde(skip_serializing_if = "Option::is_none")]
        provisional: Option<bool>,
    },
    Full {
        obtained_points: f64,
        total_points: f64,
        percentage: f64,
        passed: Option<bool>,
        pending_review: bool,
        feedback: Option<String>,
        questions: Vec<QuestionResultView>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionView {
    pub submission_id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub attempt_number: i32,
    pub status: SubmissionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub detail: ResultDetail,
}
