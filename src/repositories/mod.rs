//! Collaborator contracts the engine consumes, plus the two implementations shipped with it.

pub mod assessments;
pub mod memory;
pub mod postgres;
pub mod questions;
pub mod submissions;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::types::SubmissionStatus;
use crate::schemas::assessment::{Assessment, Question};
use crate::schemas::submission::Submission;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// Unique-key or version mismatch; the caller re-reads and decides.
    #[error("conflicting concurrent write")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict,
            _ => Self::Backend(anyhow::Error::new(err)),
        }
    }
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Assessment, StoreError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Questions ordered by `order_index`.
    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Question>, StoreError>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Fails with `Conflict` when the attempt number is taken or another attempt is in progress.
    async fn create(&self, submission: &Submission) -> Result<Submission, StoreError>;

    async fn get(&self, id: &str) -> Result<Submission, StoreError>;

    /// Writes every mutable field if the stored version still equals `expected_version`,
    /// returning the stored record with its bumped version.
    async fn update(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<Submission, StoreError>;

    /// Ordered by attempt number.
    async fn list_by_student_and_assessment(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Submission>, StoreError>;

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError>;

    /// In-progress attempts whose deadline lies before `now`.
    async fn list_expired_in_progress(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError>;
}
