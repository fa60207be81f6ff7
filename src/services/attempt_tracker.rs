use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::errors::{EligibilityReason, EngineError, EngineResult};
use crate::db::types::SubmissionStatus;
use crate::repositories::StoreError;
use crate::schemas::assessment::Assessment;
use crate::schemas::submission::Submission;
use crate::services::engine::{map_store_error, record_conflict, GradingEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub allowed: bool,
    pub reason: Option<EligibilityReason>,
    /// Attempt number a new attempt would get when allowed.
    pub next_attempt_number: Option<i32>,
}

impl Eligibility {
    fn denied(reason: EligibilityReason) -> Self {
        Self { allowed: false, reason: Some(reason), next_attempt_number: None }
    }
}

/// Checks run in a fixed order: window opening, window closing, attempt budget, running attempt.
pub fn check_eligibility(
    assessment: &Assessment,
    prior_attempts: &[Submission],
    now: OffsetDateTime,
) -> Eligibility {
    if assessment.start_time.is_some_and(|start| now < start) {
        return Eligibility::denied(EligibilityReason::WindowNotOpen);
    }
    if assessment.end_time.is_some_and(|end| now > end) {
        return Eligibility::denied(EligibilityReason::WindowClosed);
    }
    let finalized = prior_attempts.iter().filter(|attempt| attempt.status.is_finalized()).count();
    if assessment.max_attempts.is_some_and(|max| finalized >= max.max(0) as usize) {
        return Eligibility::denied(EligibilityReason::AttemptsExhausted);
    }
    if prior_attempts.iter().any(|attempt| attempt.status == SubmissionStatus::InProgress) {
        return Eligibility::denied(EligibilityReason::AlreadyInProgress);
    }

    Eligibility {
        allowed: true,
        reason: None,
        next_attempt_number: Some(next_attempt_number(prior_attempts)),
    }
}

/// One past the highest attempt number seen so far.
pub fn next_attempt_number(prior_attempts: &[Submission]) -> i32 {
    prior_attempts.iter().map(|attempt| attempt.attempt_number).max().unwrap_or(0) + 1
}

/// The earlier of the duration limit and the window end; `None` when neither applies.
pub fn attempt_deadline(assessment: &Assessment, started_at: OffsetDateTime) -> Option<OffsetDateTime> {
    let by_duration = assessment
        .duration_minutes
        .filter(|minutes| *minutes > 0)
        .map(|minutes| started_at + Duration::minutes(i64::from(minutes)));
    match (by_duration, assessment.end_time) {
        (Some(duration_deadline), Some(end)) => Some(duration_deadline.min(end)),
        (Some(deadline), None) | (None, Some(deadline)) => Some(deadline),
        (None, None) => None,
    }
}

pub fn is_past_deadline(submission: &Submission, now: OffsetDateTime) -> bool {
    submission.expires_at.is_some_and(|deadline| now > deadline)
}

impl GradingEngine {
    /// Whether `student_id` may start a new attempt now. Overdue running attempts
    /// are finalized first so they count against the budget.
    pub async fn can_start_attempt(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> EngineResult<Eligibility> {
        let assessment = self.load_assessment(assessment_id).await?;
        let prior = self.attempts_with_overdue_closed(student_id, assessment_id).await?;
        Ok(check_eligibility(&assessment, &prior, self.now()))
    }

    /// Creates the next IN_PROGRESS attempt. Concurrent starts for the same student
    /// race on the store's uniqueness rules; losers re-check and usually get
    /// `ALREADY_IN_PROGRESS`.
    pub async fn start_attempt(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> EngineResult<Submission> {
        let assessment = self.load_assessment(assessment_id).await?;
        let max_retries = self.max_retries();

        for attempt in 0..=max_retries {
            let prior = self.attempts_with_overdue_closed(student_id, assessment_id).await?;
            let now = self.now();
            let eligibility = check_eligibility(&assessment, &prior, now);
            if let Some(reason) = eligibility.reason {
                tracing::info!(
                    student_id,
                    assessment_id,
                    reason = reason.as_str(),
                    "Attempt start rejected"
                );
                return Err(EngineError::Eligibility(reason));
            }

            let submission = Submission::start(
                Uuid::new_v4().to_string(),
                assessment_id,
                student_id,
                next_attempt_number(&prior),
                now,
                attempt_deadline(&assessment, now),
            );
            match self.submission_store().create(&submission).await {
                Ok(created) => {
                    metrics::counter!("attempts_started_total").increment(1);
                    tracing::info!(
                        submission_id = %created.id,
                        student_id,
                        assessment_id,
                        attempt_number = created.attempt_number,
                        "Attempt started"
                    );
                    return Ok(created);
                }
                Err(StoreError::Conflict) => {
                    record_conflict("start_attempt", &submission.id, attempt);
                }
                Err(err) => return Err(map_store_error(err, "submission", &submission.id)),
            }
        }

        Err(EngineError::StorageConflict { retries: max_retries })
    }

    async fn attempts_with_overdue_closed(
        &self,
        student_id: &str,
        assessment_id: &str,
    ) -> EngineResult<Vec<Submission>> {
        let mut attempts = self
            .submission_store()
            .list_by_student_and_assessment(student_id, assessment_id)
            .await
            .map_err(|err| map_store_error(err, "assessment", assessment_id))?;

        let now = self.now();
        for slot in attempts.iter_mut() {
            if slot.status == SubmissionStatus::InProgress && is_past_deadline(slot, now) {
                let closed = self.finalize_expired(&slot.id).await?.into_submission();
                *slot = closed;
            }
        }
        Ok(attempts)
    }
}
