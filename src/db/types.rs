use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assessmentkind", rename_all = "lowercase")]
pub enum AssessmentKind {
    Quiz,
    Exam,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub enum QuestionKindTag {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
    AutoGradedPendingReview,
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::AutoGradedPendingReview => "auto_graded_pending_review",
            Self::Graded => "graded",
        }
    }

    /// Counts against the attempt limit.
    pub fn is_finalized(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "finalizemode", rename_all = "lowercase")]
pub enum FinalizeMode {
    Student,
    Timeout,
}

impl FinalizeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Timeout => "timeout",
        }
    }
}
