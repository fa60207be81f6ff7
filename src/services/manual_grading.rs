use serde::Deserialize;
use validator::Validate;

use crate::core::errors::{EngineError, EngineResult};
use crate::db::types::SubmissionStatus;
use crate::repositories::StoreError;
use crate::schemas::submission::Submission;
use crate::services::engine::{map_store_error, record_conflict, GradingEngine};
use crate::services::submission_aggregator::{self, ManualScore};

/// Instructor command scoring one pending answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualScoreRequest {
    #[validate(length(min = 1))]
    pub submission_id: String,
    #[validate(length(min = 1))]
    pub question_id: String,
    /// Checked against the question's point value, not here.
    pub points: f64,
    pub feedback: Option<String>,
    #[validate(length(min = 1))]
    pub grader_id: String,
}

impl ManualScoreRequest {
    fn check(&self, max_feedback_length: u64) -> EngineResult<()> {
        self.validate().map_err(|err| EngineError::Validation(err.to_string()))?;
        check_feedback_length(self.feedback.as_deref(), max_feedback_length)
    }
}

/// Instructor comment on the submission as a whole. `None` or blank text clears it.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmissionFeedbackRequest {
    #[validate(length(min = 1))]
    pub submission_id: String,
    pub feedback: Option<String>,
    #[validate(length(min = 1))]
    pub grader_id: String,
}

impl SubmissionFeedbackRequest {
    fn check(&self, max_feedback_length: u64) -> EngineResult<()> {
        self.validate().map_err(|err| EngineError::Validation(err.to_string()))?;
        check_feedback_length(self.feedback.as_deref(), max_feedback_length)
    }

    fn normalized_feedback(&self) -> Option<String> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

fn check_feedback_length(feedback: Option<&str>, max_feedback_length: u64) -> EngineResult<()> {
    let feedback_length = feedback.map_or(0, |text| text.chars().count());
    if feedback_length as u64 > max_feedback_length {
        return Err(EngineError::Validation(format!(
            "feedback exceeds {max_feedback_length} characters"
        )));
    }
    Ok(())
}

impl GradingEngine {
    /// Scores one pending answer and re-aggregates the submission. The update is
    /// all-or-nothing; if another grader got there first the answer is no longer
    /// pending and the call fails with `NotPending`.
    pub async fn record_manual_score(&self, request: ManualScoreRequest) -> EngineResult<Submission> {
        request.check(self.settings().max_feedback_length)?;
        let submission_id = request.submission_id.as_str();

        let mut current = self.load_submission(submission_id).await?;
        let assessment = self.load_assessment(&current.assessment_id).await?;
        let questions = self.questions_for(&current.assessment_id).await?;
        let score = ManualScore {
            points: request.points,
            feedback: request.feedback.as_deref(),
            grader_id: &request.grader_id,
        };
        let max_retries = self.max_retries();

        for attempt in 0..=max_retries {
            let updated = submission_aggregator::apply_manual_score(
                &current,
                &questions,
                &request.question_id,
                &score,
                assessment.passing_points,
                self.now(),
            )?;

            match self.submission_store().update(&updated, current.version).await {
                Ok(stored) => {
                    metrics::counter!("manual_scores_recorded_total").increment(1);
                    tracing::info!(
                        submission_id,
                        question_id = %request.question_id,
                        grader_id = %request.grader_id,
                        points = request.points,
                        status = stored.status.as_str(),
                        "Manual score recorded"
                    );
                    if stored.status == SubmissionStatus::Graded {
                        metrics::counter!("submissions_graded_total", "status" => stored.status.as_str())
                            .increment(1);
                        self.notify_graded(&stored);
                    }
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => {
                    record_conflict("manual_score", submission_id, attempt);
                    current = self.load_submission(submission_id).await?;
                }
                Err(err) => return Err(map_store_error(err, "submission", submission_id)),
            }
        }

        Err(EngineError::StorageConflict { retries: max_retries })
    }

    /// Sets the submission-level feedback of an evaluated attempt. Scores, status and
    /// pending answers are left alone, so this works both before and after grading completes.
    pub async fn record_submission_feedback(
        &self,
        request: SubmissionFeedbackRequest,
    ) -> EngineResult<Submission> {
        request.check(self.settings().max_feedback_length)?;
        let submission_id = request.submission_id.as_str();
        let feedback = request.normalized_feedback();
        let max_retries = self.max_retries();

        for attempt in 0..=max_retries {
            let current = self.load_submission(submission_id).await?;
            if matches!(current.status, SubmissionStatus::InProgress | SubmissionStatus::Submitted) {
                return Err(EngineError::Validation(format!(
                    "submission {submission_id} has not been evaluated yet"
                )));
            }
            if current.feedback == feedback {
                return Ok(current);
            }

            let mut next = current.clone();
            next.feedback = feedback.clone();
            match self.submission_store().update(&next, current.version).await {
                Ok(stored) => {
                    tracing::info!(
                        submission_id,
                        grader_id = %request.grader_id,
                        cleared = stored.feedback.is_none(),
                        "Submission feedback recorded"
                    );
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => record_conflict("submission_feedback", submission_id, attempt),
                Err(err) => return Err(map_store_error(err, "submission", submission_id)),
            }
        }

        Err(EngineError::StorageConflict { retries: max_retries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineSettings;
    use crate::schemas::submission::{Correctness, SubmittedValue};
    use crate::schemas::view::{ResultDetail, Viewer};
    use crate::test_support::{self, MIXED_ASSESSMENT_ID, REVIEW_ASSESSMENT_ID};

    async fn pending_submission(ctx: &test_support::TestEngine) -> Submission {
        let attempt = ctx.engine.start_attempt("student-1", MIXED_ASSESSMENT_ID).await.unwrap();
        for (question_id, option_id) in [
            (test_support::MCQ1_ID, test_support::MCQ1_CORRECT),
            (test_support::MCQ2_ID, test_support::MCQ2_WRONG),
        ] {
            ctx.engine
                .save_answer(
                    &attempt.id,
                    "student-1",
                    question_id,
                    Some(SubmittedValue::SelectedOption(option_id.to_string())),
                )
                .await
                .unwrap();
        }
        ctx.engine.finalize(&attempt.id, "student-1").await.unwrap().into_submission()
    }

    #[tokio::test]
    async fn essay_score_completes_grading_and_notifies() {
        let mut ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;

        let graded = ctx
            .engine
            .record_manual_score(test_support::essay_score(&pending.id, 6.0))
            .await
            .unwrap();

        assert_eq!(graded.status, SubmissionStatus::Graded);
        assert_eq!(graded.obtained_points, 11.0);
        assert_eq!(graded.percentage, 55.0);
        assert_eq!(graded.passed, Some(true));
        let essay = graded.answer(test_support::ESSAY_ID).unwrap();
        assert_eq!(essay.correctness, Some(Correctness::Partial));
        assert_eq!(essay.feedback.as_deref(), Some("Well argued"));

        let notified = ctx.next_notification().await;
        assert_eq!(notified.id, graded.id);
        assert_eq!(notified.status, SubmissionStatus::Graded);
    }

    fn overall_feedback(submission_id: &str, text: Option<&str>) -> SubmissionFeedbackRequest {
        SubmissionFeedbackRequest {
            submission_id: submission_id.to_string(),
            feedback: text.map(str::to_string),
            grader_id: "instructor-1".to_string(),
        }
    }

    #[tokio::test]
    async fn grading_completes_only_after_every_pending_answer_is_scored() {
        let mut ctx = test_support::engine_with(test_support::review_assessment()).await;
        let attempt = ctx.engine.start_attempt("student-1", REVIEW_ASSESSMENT_ID).await.unwrap();
        ctx.engine
            .save_answer(
                &attempt.id,
                "student-1",
                test_support::MCQ1_ID,
                Some(SubmittedValue::SelectedOption(test_support::MCQ1_CORRECT.to_string())),
            )
            .await
            .unwrap();
        ctx.engine
            .save_answer(
                &attempt.id,
                "student-1",
                test_support::OPEN_SHORT_ID,
                Some(SubmittedValue::Text("Lifetimes are inferred".to_string())),
            )
            .await
            .unwrap();
        let pending = ctx.engine.finalize(&attempt.id, "student-1").await.unwrap().into_submission();
        assert_eq!(pending.pending_count(), 2);

        let still_pending = ctx
            .engine
            .record_manual_score(test_support::essay_score(&pending.id, 7.0))
            .await
            .unwrap();
        assert_eq!(still_pending.status, SubmissionStatus::AutoGradedPendingReview);
        assert_eq!(still_pending.obtained_points, 11.0);
        assert_eq!(still_pending.passed, None);
        assert!(still_pending.provisional);
        assert_eq!(still_pending.pending_count(), 1);
        ctx.assert_no_notification().await;

        let graded = ctx
            .engine
            .record_manual_score(ManualScoreRequest {
                question_id: test_support::OPEN_SHORT_ID.to_string(),
                feedback: None,
                ..test_support::essay_score(&pending.id, 3.0)
            })
            .await
            .unwrap();
        assert_eq!(graded.status, SubmissionStatus::Graded);
        assert_eq!(graded.obtained_points, 14.0);
        assert_eq!(graded.percentage, 70.0);
        assert_eq!(graded.passed, Some(true));
        assert_eq!(ctx.next_notification().await.id, graded.id);
    }

    #[tokio::test]
    async fn submission_feedback_is_stored_and_shown_with_full_results() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;
        ctx.engine.record_manual_score(test_support::essay_score(&pending.id, 6.0)).await.unwrap();

        let stored = ctx
            .engine
            .record_submission_feedback(overall_feedback(&pending.id, Some("  Good grasp of moves. ")))
            .await
            .unwrap();
        assert_eq!(stored.feedback.as_deref(), Some("Good grasp of moves."));
        assert_eq!(stored.status, SubmissionStatus::Graded);
        assert_eq!(stored.obtained_points, 11.0);

        let view = ctx.engine.results_for(&pending.id, &Viewer::student("student-1")).await.unwrap();
        let ResultDetail::Full { feedback, .. } = &view.detail else {
            panic!("expected full results, got {:?}", view.detail);
        };
        assert_eq!(feedback.as_deref(), Some("Good grasp of moves."));

        let cleared = ctx
            .engine
            .record_submission_feedback(overall_feedback(&pending.id, Some("   ")))
            .await
            .unwrap();
        assert_eq!(cleared.feedback, None);
    }

    #[tokio::test]
    async fn submission_feedback_can_precede_the_last_manual_score() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;

        let commented = ctx
            .engine
            .record_submission_feedback(overall_feedback(&pending.id, Some("Essay still to read")))
            .await
            .unwrap();
        assert_eq!(commented.status, SubmissionStatus::AutoGradedPendingReview);
        assert_eq!(commented.answers, pending.answers);

        let graded =
            ctx.engine.record_manual_score(test_support::essay_score(&pending.id, 6.0)).await.unwrap();
        assert_eq!(graded.feedback.as_deref(), Some("Essay still to read"));
    }

    #[tokio::test]
    async fn submission_feedback_requires_an_evaluated_attempt() {
        let ctx = test_support::engine_with(test_support::mixed_assessment())
            .await
            .with_settings(EngineSettings { max_feedback_length: 5, ..EngineSettings::default() });
        let attempt = ctx.engine.start_attempt("student-1", MIXED_ASSESSMENT_ID).await.unwrap();

        let err = ctx
            .engine
            .record_submission_feedback(overall_feedback(&attempt.id, Some("Hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(message) if message.contains("not been evaluated")));

        let err = ctx
            .engine
            .record_submission_feedback(overall_feedback(&attempt.id, Some("Far too long")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(message) if message.contains("feedback")));

        let err = ctx
            .engine
            .record_submission_feedback(overall_feedback("missing", Some("Hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn persistent_write_conflicts_surface_as_transient_failures() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;
        let mut ctx = ctx.with_contended_updates();
        let max_retries = ctx.engine.settings().max_conflict_retries;

        let err = ctx
            .engine
            .record_manual_score(test_support::essay_score(&pending.id, 6.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StorageConflict { retries } if retries == max_retries));
        assert!(err.is_transient());
        assert_eq!(ctx.contended_update_calls(), max_retries + 1);
        assert_eq!(ctx.engine.submission(&pending.id).await.unwrap(), pending);
        ctx.assert_no_notification().await;

        let err = ctx
            .engine
            .record_submission_feedback(overall_feedback(&pending.id, Some("Noted")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StorageConflict { retries } if retries == max_retries));
    }

    #[tokio::test]
    async fn rescoring_a_graded_answer_is_rejected() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;
        ctx.engine.record_manual_score(test_support::essay_score(&pending.id, 6.0)).await.unwrap();

        let err = ctx
            .engine
            .record_manual_score(test_support::essay_score(&pending.id, 8.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotPending { .. }));
        assert_eq!(ctx.engine.submission(&pending.id).await.unwrap().obtained_points, 11.0);
    }

    #[tokio::test]
    async fn invalid_scores_leave_the_submission_untouched() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;

        let err = ctx
            .engine
            .record_manual_score(test_support::essay_score(&pending.id, 12.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidScore { max_points, .. } if max_points == 10.0));
        assert_eq!(ctx.engine.submission(&pending.id).await.unwrap(), pending);
    }

    #[tokio::test]
    async fn malformed_requests_fail_validation() {
        let ctx = test_support::engine_with(test_support::mixed_assessment())
            .await
            .with_settings(EngineSettings { max_feedback_length: 5, ..EngineSettings::default() });
        let pending = pending_submission(&ctx).await;

        let mut request = test_support::essay_score(&pending.id, 6.0);
        request.grader_id.clear();
        let err = ctx.engine.record_manual_score(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let request = test_support::essay_score(&pending.id, 6.0);
        let err = ctx.engine.record_manual_score(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(message) if message.contains("feedback")));
    }

    #[tokio::test]
    async fn concurrent_graders_cannot_both_score_the_same_answer() {
        let ctx = test_support::engine_with(test_support::mixed_assessment()).await;
        let pending = pending_submission(&ctx).await;

        let (first, second) = tokio::join!(
            ctx.engine.record_manual_score(test_support::essay_score(&pending.id, 4.0)),
            ctx.engine.record_manual_score(test_support::essay_score(&pending.id, 7.0)),
        );

        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let err = first.err().or(second.err()).unwrap();
        assert!(matches!(err, EngineError::NotPending { .. }));
    }
}
