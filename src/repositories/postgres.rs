use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::{assessments, questions, submissions};
use super::{AssessmentStore, QuestionStore, StoreError, SubmissionStore};
use crate::db::models::SubmissionRow;
use crate::db::types::SubmissionStatus;
use crate::schemas::assessment::{Assessment, Question};
use crate::schemas::submission::Submission;

/// Postgres-backed collaborators. Uniqueness of attempts and of the single in-progress
/// attempt is enforced by constraints; updates compare-and-swap on `version`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_submissions(rows: Vec<SubmissionRow>) -> Vec<Submission> {
    rows.into_iter().map(Submission::from).collect()
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn get(&self, id: &str) -> Result<Assessment, StoreError> {
        let row = assessments::find_by_id(&self.pool, id).await?.ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Question>, StoreError> {
        let rows = questions::list_by_assessment(&self.pool, assessment_id).await?;
        let options = questions::list_options_by_assessment(&self.pool, assessment_id).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let question = row.into_question(&options).context("Malformed question row")?;
            result.push(question);
        }
        Ok(result)
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn create(&self, submission: &Submission) -> Result<Submission, StoreError> {
        if !submissions::create_if_absent(&self.pool, submission).await? {
            return Err(StoreError::Conflict);
        }
        let row =
            submissions::find_by_id(&self.pool, &submission.id).await?.ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        let row = submissions::find_by_id(&self.pool, id).await?.ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<Submission, StoreError> {
        match submissions::update_if_version(&self.pool, submission, expected_version).await? {
            Some(row) => Ok(row.into()),
            None => {
                if submissions::find_by_id(&self.pool, &submission.id).await?.is_none() {
                    Err(StoreError::NotFound)
                } else {
                    Err(StoreError::Conflict)
                }
            }
        }
    }

    async fn list_by_student_and_assessment(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        let rows =
            submissions::list_by_student_and_assessment(&self.pool, student_id, assessment_id)
                .await?;
        Ok(into_submissions(rows))
    }

    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Submission>, StoreError> {
        let rows = submissions::list_by_assessment(&self.pool, assessment_id).await?;
        Ok(into_submissions(rows))
    }

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let rows = submissions::list_by_status(&self.pool, status, limit).await?;
        Ok(into_submissions(rows))
    }

    async fn list_expired_in_progress(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let rows = submissions::list_expired_in_progress(&self.pool, now, limit).await?;
        Ok(into_submissions(rows))
    }
}
