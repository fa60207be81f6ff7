use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{AssessmentStore, QuestionStore, StoreError, SubmissionStore};
use crate::db::types::SubmissionStatus;
use crate::schemas::assessment::{Assessment, Question};
use crate::schemas::submission::Submission;

/// In-process collaborators with the same uniqueness and versioning rules as Postgres.
#[derive(Default)]
pub struct InMemoryStore {
    assessments: RwLock<HashMap<String, Assessment>>,
    questions: RwLock<HashMap<String, Vec<Question>>>,
    submissions: RwLock<HashMap<String, Submission>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an assessment and its questions. Malformed questions reject the whole set.
    pub async fn put_assessment(
        &self,
        assessment: Assessment,
        mut questions: Vec<Question>,
    ) -> Result<(), StoreError> {
        for question in &questions {
            question.check_shape()?;
        }
        questions.sort_by_key(|question| question.order_index);
        self.questions.write().await.insert(assessment.id.clone(), questions);
        self.assessments.write().await.insert(assessment.id.clone(), assessment);
        Ok(())
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }
}

fn sorted(mut submissions: Vec<Submission>) -> Vec<Submission> {
    submissions.sort_by(|a, b| {
        (&a.assessment_id, &a.student_id, a.attempt_number).cmp(&(
            &b.assessment_id,
            &b.student_id,
            b.attempt_number,
        ))
    });
    submissions
}

#[async_trait]
impl AssessmentStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Assessment, StoreError> {
        self.assessments.read().await.get(id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl QuestionStore for InMemoryStore {
    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Question>, StoreError> {
        Ok(self.questions.read().await.get(assessment_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn create(&self, submission: &Submission) -> Result<Submission, StoreError> {
        let mut guard = self.submissions.write().await;

        let clashes = guard.values().any(|existing| {
            existing.id == submission.id
                || (existing.assessment_id == submission.assessment_id
                    && existing.student_id == submission.student_id
                    && (existing.attempt_number == submission.attempt_number
                        || (existing.status == SubmissionStatus::InProgress
                            && submission.status == SubmissionStatus::InProgress)))
        });
        if clashes {
            return Err(StoreError::Conflict);
        }

        let mut stored = submission.clone();
        stored.version = 0;
        guard.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        self.submissions.read().await.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<Submission, StoreError> {
        let mut guard = self.submissions.write().await;
        let current = guard.get_mut(&submission.id).ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::Conflict);
        }

        let mut stored = submission.clone();
        stored.version = expected_version + 1;
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_by_student_and_assessment(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.submissions.read().await;
        Ok(sorted(
            guard
                .values()
                .filter(|s| s.student_id == student_id && s.assessment_id == assessment_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_assessment(&self, assessment_id: &str) -> Result<Vec<Submission>, StoreError> {
        let guard = self.submissions.read().await;
        Ok(sorted(guard.values().filter(|s| s.assessment_id == assessment_id).cloned().collect()))
    }

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.submissions.read().await;
        let mut matching = sorted(guard.values().filter(|s| s.status == status).cloned().collect());
        matching.truncate(limit.max(1) as usize);
        Ok(matching)
    }

    async fn list_expired_in_progress(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.submissions.read().await;
        let mut expired: Vec<Submission> = guard
            .values()
            .filter(|s| {
                s.status == SubmissionStatus::InProgress
                    && s.expires_at.is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.expires_at);
        expired.truncate(limit.max(1) as usize);
        Ok(expired)
    }
}
