use crate::core::errors::{EngineError, EngineResult};
use crate::db::types::SubmissionStatus;
use crate::repositories::StoreError;
use crate::schemas::assessment::{Assessment, Question, QuestionKind};
use crate::schemas::submission::{AnswerRecord, Submission};
use crate::schemas::view::{CorrectAnswer, QuestionResultView, ResultDetail, SubmissionView, Viewer};
use crate::services::engine::{map_store_error, record_conflict, GradingEngine};
use crate::services::question_catalog::QuestionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityPolicy {
    /// Mark interim scores shown to students as provisional.
    pub label_provisional: bool,
}

/// Filters a submission for `viewer`. Staff see everything; students see an acknowledgment
/// until results are visible, then a provisional score while review is pending, then
/// full detail once graded.
pub fn results_visible_to(
    submission: &Submission,
    assessment: &Assessment,
    questions: &QuestionSet,
    viewer: &Viewer,
    policy: VisibilityPolicy,
) -> EngineResult<SubmissionView> {
    let detail = if viewer.is_staff() {
        full_detail(submission, questions, true)
    } else {
        if viewer.user_id != submission.student_id {
            return Err(EngineError::Forbidden("students may only view their own submissions"));
        }
        student_detail(submission, assessment, questions, policy)
    };

    Ok(SubmissionView {
        submission_id: submission.id.clone(),
        assessment_id: submission.assessment_id.clone(),
        student_id: submission.student_id.clone(),
        attempt_number: submission.attempt_number,
        status: submission.status,
        submitted_at: submission.submitted_at,
        detail,
    })
}

fn student_detail(
    submission: &Submission,
    assessment: &Assessment,
    questions: &QuestionSet,
    policy: VisibilityPolicy,
) -> ResultDetail {
    if !assessment.show_results_immediately && !submission.is_released() {
        return ResultDetail::Acknowledged;
    }
    match submission.status {
        SubmissionStatus::InProgress | SubmissionStatus::Submitted => ResultDetail::Acknowledged,
        SubmissionStatus::AutoGradedPendingReview => ResultDetail::Provisional {
            obtained_points: submission.obtained_points,
            total_points: submission.total_points,
            percentage: submission.percentage,
            pending_review: true,
            provisional: policy.label_provisional.then_some(true),
        },
        SubmissionStatus::Graded => full_detail(submission, questions, false),
    }
}

fn full_detail(submission: &Submission, questions: &QuestionSet, staff: bool) -> ResultDetail {
    let questions = questions
        .questions()
        .iter()
        .map(|question| question_view(question, submission.answer(&question.id), staff))
        .collect();

    ResultDetail::Full {
        obtained_points: submission.obtained_points,
        total_points: submission.total_points,
        percentage: submission.percentage,
        passed: submission.passed,
        pending_review: submission.status == SubmissionStatus::AutoGradedPendingReview,
        feedback: submission.feedback.clone(),
        questions,
    }
}

fn question_view(question: &Question, record: Option<&AnswerRecord>, staff: bool) -> QuestionResultView {
    let pending = record.is_some_and(AnswerRecord::is_pending);
    // Keys of ungraded answers stay hidden from students.
    let correct_answer = if staff || !pending { correct_answer(&question.kind) } else { None };

    QuestionResultView {
        question_id: question.id.clone(),
        order_index: question.order_index,
        question_type: question.kind.as_str(),
        max_points: question.points,
        submitted: record.and_then(|record| record.value.clone()),
        awarded_points: record.and_then(|record| record.awarded_points),
        correctness: record.and_then(|record| record.correctness),
        feedback: record.and_then(|record| record.feedback.clone()),
        correct_answer,
    }
}

fn correct_answer(kind: &QuestionKind) -> Option<CorrectAnswer> {
    match kind {
        QuestionKind::MultipleChoice { options } | QuestionKind::TrueFalse { options } => {
            Some(CorrectAnswer::Options(
                options.iter().filter(|option| option.is_correct).map(|option| option.id.clone()).collect(),
            ))
        }
        QuestionKind::ShortAnswer { model_answer } => model_answer.clone().map(CorrectAnswer::Text),
        QuestionKind::Essay => None,
    }
}

impl GradingEngine {
    pub fn visibility_policy(&self) -> VisibilityPolicy {
        VisibilityPolicy { label_provisional: self.settings().label_provisional }
    }

    pub async fn results_for(&self, submission_id: &str, viewer: &Viewer) -> EngineResult<SubmissionView> {
        let submission = self.load_submission(submission_id).await?;
        let assessment = self.load_assessment(&submission.assessment_id).await?;
        let questions = self.questions_for(&submission.assessment_id).await?;
        results_visible_to(&submission, &assessment, &questions, viewer, self.visibility_policy())
    }

    /// Instructor release of one submission's results. Releasing twice keeps the first timestamp.
    pub async fn release_results(&self, submission_id: &str) -> EngineResult<Submission> {
        let max_retries = self.max_retries();
        for attempt in 0..=max_retries {
            let current = self.load_submission(submission_id).await?;
            if current.is_released() {
                return Ok(current);
            }
            let mut next = current.clone();
            next.results_released_at = Some(self.now());
            match self.submission_store().update(&next, current.version).await {
                Ok(stored) => {
                    tracing::info!(submission_id, "Results released");
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => record_conflict("release", submission_id, attempt),
                Err(err) => return Err(map_store_error(err, "submission", submission_id)),
            }
        }
        Err(EngineError::StorageConflict { retries: max_retries })
    }

    /// Releases every finalized submission of an assessment; returns how many changed.
    /// Attempts still in progress are left for a later release.
    pub async fn release_assessment_results(&self, assessment_id: &str) -> EngineResult<usize> {
        self.load_assessment(assessment_id).await?;
        let submissions = self
            .submission_store()
            .list_by_assessment(assessment_id)
            .await
            .map_err(|err| map_store_error(err, "assessment", assessment_id))?;

        let mut released = 0;
        for submission in submissions {
            if !submission.status.is_finalized() || submission.is_released() {
                continue;
            }
            self.release_results(&submission.id).await?;
            released += 1;
        }
        tracing::info!(assessment_id, released, "Assessment results released");
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::submission::SubmittedValue;
    use crate::test_support::{self, MIXED_ASSESSMENT_ID};

    async fn graded_scenario(show_immediately: bool) -> (test_support::TestEngine, Submission) {
        let mut fixture = test_support::mixed_assessment();
        fixture.assessment.show_results_immediately = show_immediately;
        let ctx = test_support::engine_with(fixture).await;

        let attempt = ctx.engine.start_attempt("student-1", MIXED_ASSESSMENT_ID).await.unwrap();
        ctx.engine
            .save_answer(
                &attempt.id,
                "student-1",
                test_support::MCQ1_ID,
                Some(SubmittedValue::SelectedOption(test_support::MCQ1_CORRECT.into())),
            )
            .await
            .unwrap();
        let pending = ctx.engine.finalize(&attempt.id, "student-1").await.unwrap().into_submission();
        (ctx, pending)
    }

    fn score_fields_absent(view: &SubmissionView) -> bool {
        let value = serde_json::to_value(view).unwrap();
        value.get("obtained_points").is_none() && value.get("percentage").is_none()
    }

    #[tokio::test]
    async fn pending_review_shows_provisional_score_only() {
        let (ctx, pending) = graded_scenario(true).await;

        let view = ctx.engine.results_for(&pending.id, &Viewer::student("student-1")).await.unwrap();
        match view.detail {
            ResultDetail::Provisional { obtained_points, pending_review, provisional, .. } => {
                assert_eq!(obtained_points, 5.0);
                assert!(pending_review);
                assert_eq!(provisional, Some(true));
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[tokio::test]
    async fn staff_always_see_answer_keys() {
        let (ctx, pending) = graded_scenario(false).await;

        let view = ctx.engine.results_for(&pending.id, &Viewer::instructor("instructor-1")).await.unwrap();
        let ResultDetail::Full { questions, pending_review, .. } = view.detail else {
            panic!("staff should get full detail");
        };
        assert!(pending_review);
        assert_eq!(questions.len(), 3);
        assert_eq!(
            questions[0].correct_answer,
            Some(CorrectAnswer::Options(vec![test_support::MCQ1_CORRECT.to_string()]))
        );
    }

    #[tokio::test]
    async fn unreleased_results_are_only_acknowledged() {
        let (ctx, pending) = graded_scenario(false).await;
        ctx.engine
            .record_manual_score(test_support::essay_score(&pending.id, 6.0))
            .await
            .unwrap();

        let student = Viewer::student("student-1");
        let view = ctx.engine.results_for(&pending.id, &student).await.unwrap();
        assert_eq!(view.status, SubmissionStatus::Graded);
        assert_eq!(view.detail, ResultDetail::Acknowledged);
        assert!(score_fields_absent(&view));

        let released = ctx.engine.release_results(&pending.id).await.unwrap();
        assert!(released.is_released());
        let view = ctx.engine.results_for(&pending.id, &student).await.unwrap();
        let ResultDetail::Full { passed, questions, .. } = view.detail else {
            panic!("released graded result should be full");
        };
        assert_eq!(passed, Some(true));
        assert!(questions.iter().any(|question| question.question_type == "ESSAY"));
    }

    #[tokio::test]
    async fn students_cannot_read_other_submissions() {
        let (ctx, pending) = graded_scenario(true).await;

        let err = ctx.engine.results_for(&pending.id, &Viewer::student("student-2")).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn provisional_label_can_be_disabled() {
        let (ctx, pending) = graded_scenario(true).await;
        let assessment = ctx.engine.load_assessment(MIXED_ASSESSMENT_ID).await.unwrap();
        let questions = ctx.engine.questions_for(MIXED_ASSESSMENT_ID).await.unwrap();

        let view = results_visible_to(
            &pending,
            &assessment,
            &questions,
            &Viewer::student("student-1"),
            VisibilityPolicy { label_provisional: false },
        )
        .unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["visibility"], "provisional");
        assert!(json.get("provisional").is_none());
    }

    #[tokio::test]
    async fn assessment_release_skips_running_attempts() {
        let (ctx, pending) = graded_scenario(false).await;
        ctx.engine.start_attempt("student-2", MIXED_ASSESSMENT_ID).await.unwrap();

        assert_eq!(ctx.engine.release_assessment_results(MIXED_ASSESSMENT_ID).await.unwrap(), 1);
        assert_eq!(ctx.engine.release_assessment_results(MIXED_ASSESSMENT_ID).await.unwrap(), 0);
        assert!(ctx.engine.submission(&pending.id).await.unwrap().is_released());
    }
}
