use serde::Serialize;
use thiserror::Error;

/// Why a student may not start a new attempt right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityReason {
    WindowNotOpen,
    WindowClosed,
    AttemptsExhausted,
    AlreadyInProgress,
}

impl EligibilityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WindowNotOpen => "WINDOW_NOT_OPEN",
            Self::WindowClosed => "WINDOW_CLOSED",
            Self::AttemptsExhausted => "ATTEMPTS_EXHAUSTED",
            Self::AlreadyInProgress => "ALREADY_IN_PROGRESS",
        }
    }
}

impl std::fmt::Display for EligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("attempt not allowed: {0}")]
    Eligibility(EligibilityReason),
    #[error("invalid score {points} for question {question_id} (allowed 0..={max_points})")]
    InvalidScore { question_id: String, points: f64, max_points: f64 },
    #[error("answer for question {question_id} is not pending manual review")]
    NotPending { question_id: String },
    #[error("submission {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("storage conflict persisted after {retries} retries")]
    StorageConflict { retries: u32 },
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{kind} '{id}'"))
    }

    /// Outcomes of a legitimate race; the caller re-reads state instead of reporting a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyFinalized(_))
    }

    /// Failures worth retrying later from the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageConflict { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
