use time::OffsetDateTime;

use crate::core::errors::{EligibilityReason, EngineError, EngineResult};
use crate::db::types::{FinalizeMode, SubmissionStatus};
use crate::repositories::StoreError;
use crate::schemas::submission::{AnswerRecord, Submission, SubmittedValue};
use crate::services::attempt_tracker::is_past_deadline;
use crate::services::engine::{map_store_error, record_conflict, GradingEngine};
use crate::services::submission_aggregator;

/// Result of a finalize call. Losing a race against another finalize is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Finalized(Submission),
    /// Someone else finalized first; carries the current state.
    AlreadyFinalized(Submission),
}

impl FinalizeOutcome {
    pub fn submission(&self) -> &Submission {
        match self {
            Self::Finalized(submission) | Self::AlreadyFinalized(submission) => submission,
        }
    }

    pub fn into_submission(self) -> Submission {
        match self {
            Self::Finalized(submission) | Self::AlreadyFinalized(submission) => submission,
        }
    }

    pub fn was_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }
}

/// Mode and submit time actually recorded. Late student finalizes count as timeouts
/// stamped at the deadline.
fn resolve_finalize(
    submission: &Submission,
    requested: FinalizeMode,
    now: OffsetDateTime,
) -> (FinalizeMode, OffsetDateTime) {
    match submission.expires_at {
        Some(deadline) if now > deadline => (FinalizeMode::Timeout, deadline),
        _ => (requested, now),
    }
}

impl GradingEngine {
    pub async fn submission(&self, submission_id: &str) -> EngineResult<Submission> {
        self.load_submission(submission_id).await
    }

    /// Student-initiated finalize followed by immediate evaluation.
    pub async fn finalize(
        &self,
        submission_id: &str,
        student_id: &str,
    ) -> EngineResult<FinalizeOutcome> {
        self.finalize_submission(submission_id, FinalizeMode::Student, Some(student_id)).await
    }

    /// Timeout finalize used by the sweep and by late actions. Refuses attempts
    /// that have not reached their deadline.
    pub async fn finalize_expired(&self, submission_id: &str) -> EngineResult<FinalizeOutcome> {
        self.finalize_submission(submission_id, FinalizeMode::Timeout, None).await
    }

    async fn finalize_submission(
        &self,
        submission_id: &str,
        mode: FinalizeMode,
        student_id: Option<&str>,
    ) -> EngineResult<FinalizeOutcome> {
        let max_retries = self.max_retries();
        let mut attempt = 0;

        let stored = loop {
            let current = self.load_submission(submission_id).await?;
            if student_id.is_some_and(|student| student != current.student_id) {
                return Err(EngineError::Forbidden("only the owning student may finalize"));
            }
            if current.status != SubmissionStatus::InProgress {
                tracing::info!(
                    submission_id,
                    status = current.status.as_str(),
                    "Finalize skipped, submission already finalized"
                );
                return Ok(FinalizeOutcome::AlreadyFinalized(current));
            }

            let now = self.now();
            if mode == FinalizeMode::Timeout && !is_past_deadline(&current, now) {
                return Err(EngineError::Validation(format!(
                    "submission {submission_id} has not reached its deadline"
                )));
            }
            let (mode, submitted_at) = resolve_finalize(&current, mode, now);

            let mut next = current.clone();
            next.status = SubmissionStatus::Submitted;
            next.submitted_at = Some(submitted_at);
            next.finalize_mode = Some(mode);

            match self.submission_store().update(&next, current.version).await {
                Ok(stored) => break stored,
                Err(StoreError::Conflict) if attempt < max_retries => {
                    record_conflict("finalize", submission_id, attempt);
                    attempt += 1;
                }
                Err(StoreError::Conflict) => {
                    return Err(EngineError::StorageConflict { retries: max_retries })
                }
                Err(err) => return Err(map_store_error(err, "submission", submission_id)),
            }
        };

        let mode = stored.finalize_mode.unwrap_or(mode);
        metrics::counter!("submissions_finalized_total", "mode" => mode.as_str()).increment(1);
        tracing::info!(
            submission_id,
            student_id = %stored.student_id,
            mode = mode.as_str(),
            "Submission finalized"
        );

        // The recovery sweep re-runs evaluation for anything left in SUBMITTED.
        match self.evaluate_submitted(stored.clone()).await {
            Ok(evaluated) => Ok(FinalizeOutcome::Finalized(evaluated)),
            Err(err) => {
                tracing::error!(submission_id, error = %err, "Evaluation after finalize failed");
                Ok(FinalizeOutcome::Finalized(stored))
            }
        }
    }

    /// Runs evaluation for a SUBMITTED attempt. Already evaluated attempts come back unchanged.
    pub async fn evaluate_all(&self, submission_id: &str) -> EngineResult<Submission> {
        let current = self.load_submission(submission_id).await?;
        self.evaluate_submitted(current).await
    }

    pub(crate) async fn evaluate_submitted(&self, mut current: Submission) -> EngineResult<Submission> {
        if current.status.is_finalized() && current.status != SubmissionStatus::Submitted {
            return Ok(current);
        }
        let assessment = self.load_assessment(&current.assessment_id).await?;
        let questions = self.questions_for(&current.assessment_id).await?;
        let max_retries = self.max_retries();

        for attempt in 0..=max_retries {
            let evaluated = submission_aggregator::evaluate_all(
                &questions,
                &current,
                assessment.passing_points,
                self.matcher(),
                self.now(),
            )?;
            if evaluated == current {
                return Ok(current);
            }

            match self.submission_store().update(&evaluated, current.version).await {
                Ok(stored) => {
                    metrics::counter!("submissions_graded_total", "status" => stored.status.as_str())
                        .increment(1);
                    tracing::info!(
                        submission_id = %stored.id,
                        status = stored.status.as_str(),
                        obtained_points = stored.obtained_points,
                        total_points = stored.total_points,
                        pending = stored.pending_count(),
                        "Submission evaluated"
                    );
                    if stored.status == SubmissionStatus::Graded {
                        self.notify_graded(&stored);
                    }
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => {
                    record_conflict("evaluate", &current.id, attempt);
                    current = self.load_submission(&current.id).await?;
                }
                Err(err) => return Err(map_store_error(err, "submission", &current.id)),
            }
        }

        Err(EngineError::StorageConflict { retries: max_retries })
    }

    /// Records or replaces the student's answer to one question. `None` clears it.
    /// After the deadline the attempt is closed instead and `WINDOW_CLOSED` is returned.
    pub async fn save_answer(
        &self,
        submission_id: &str,
        student_id: &str,
        question_id: &str,
        value: Option<SubmittedValue>,
    ) -> EngineResult<Submission> {
        let max_retries = self.max_retries();
        let mut questions = None;

        for attempt in 0..=max_retries {
            let current = self.load_submission(submission_id).await?;
            if current.student_id != student_id {
                return Err(EngineError::Forbidden("only the owning student may answer"));
            }
            if current.status != SubmissionStatus::InProgress {
                return Err(EngineError::AlreadyFinalized(current.id));
            }
            if is_past_deadline(&current, self.now()) {
                self.finalize_expired(submission_id).await?;
                return Err(EngineError::Eligibility(EligibilityReason::WindowClosed));
            }

            let set = match questions.take() {
                Some(set) => set,
                None => self.questions_for(&current.assessment_id).await?,
            };
            if !set.contains(question_id) {
                return Err(EngineError::not_found("question", question_id));
            }
            questions = Some(set);

            let mut next = current.clone();
            next.answers.retain(|record| record.question_id != question_id);
            if let Some(value) = value.clone() {
                next.answers.push(AnswerRecord::answered(question_id, value));
            }

            match self.submission_store().update(&next, current.version).await {
                Ok(stored) => {
                    tracing::debug!(submission_id, question_id, "Answer saved");
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => record_conflict("save_answer", submission_id, attempt),
                Err(err) => return Err(map_store_error(err, "submission", submission_id)),
            }
        }

        Err(EngineError::StorageConflict { retries: max_retries })
    }
}
