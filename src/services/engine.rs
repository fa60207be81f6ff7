use std::sync::Arc;

use crate::core::config::EngineSettings;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::time::{Clock, SystemClock};
use crate::repositories::{AssessmentStore, QuestionStore, StoreError, SubmissionStore};
use crate::schemas::assessment::Assessment;
use crate::schemas::submission::Submission;
use crate::services::answer_evaluator::{ExactMatch, ShortAnswerMatcher};
use crate::services::notifications::{self, GradedNotifier, NoopNotifier};

/// Entry point for every grading operation. Cheap to clone; all collaborators are shared.
///
/// Operations live next to the component they belong to:
/// [`question_catalog`](crate::services::question_catalog),
/// [`attempt_tracker`](crate::services::attempt_tracker),
/// [`submission_finalize`](crate::services::submission_finalize),
/// [`manual_grading`](crate::services::manual_grading) and
/// [`result_visibility`](crate::services::result_visibility).
#[derive(Clone)]
pub struct GradingEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    assessments: Arc<dyn AssessmentStore>,
    questions: Arc<dyn QuestionStore>,
    submissions: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn GradedNotifier>,
    matcher: Arc<dyn ShortAnswerMatcher>,
    settings: EngineSettings,
}

pub struct GradingEngineBuilder {
    assessments: Arc<dyn AssessmentStore>,
    questions: Arc<dyn QuestionStore>,
    submissions: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn GradedNotifier>,
    matcher: Arc<dyn ShortAnswerMatcher>,
    settings: EngineSettings,
}

impl GradingEngine {
    pub fn builder(
        assessments: Arc<dyn AssessmentStore>,
        questions: Arc<dyn QuestionStore>,
        submissions: Arc<dyn SubmissionStore>,
    ) -> GradingEngineBuilder {
        GradingEngineBuilder {
            assessments,
            questions,
            submissions,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            matcher: Arc::new(ExactMatch),
            settings: EngineSettings::default(),
        }
    }

    /// Builder over a single backend implementing all three stores.
    pub fn with_store<S>(store: Arc<S>) -> GradingEngineBuilder
    where
        S: AssessmentStore + QuestionStore + SubmissionStore + 'static,
    {
        Self::builder(store.clone(), store.clone(), store)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub(crate) fn now(&self) -> time::OffsetDateTime {
        self.inner.clock.now()
    }

    pub(crate) fn question_store(&self) -> &dyn QuestionStore {
        self.inner.questions.as_ref()
    }

    pub(crate) fn submission_store(&self) -> &dyn SubmissionStore {
        self.inner.submissions.as_ref()
    }

    pub(crate) fn matcher(&self) -> &dyn ShortAnswerMatcher {
        self.inner.matcher.as_ref()
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.inner.settings.max_conflict_retries
    }

    pub(crate) async fn load_assessment(&self, assessment_id: &str) -> EngineResult<Assessment> {
        self.inner
            .assessments
            .get(assessment_id)
            .await
            .map_err(|err| map_store_error(err, "assessment", assessment_id))
    }

    pub(crate) async fn load_submission(&self, submission_id: &str) -> EngineResult<Submission> {
        self.inner
            .submissions
            .get(submission_id)
            .await
            .map_err(|err| map_store_error(err, "submission", submission_id))
    }

    pub(crate) fn notify_graded(&self, submission: &Submission) {
        notifications::dispatch_graded(self.inner.notifier.clone(), submission.clone());
    }
}

impl GradingEngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn GradedNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn short_answer_matcher(mut self, matcher: Arc<dyn ShortAnswerMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> GradingEngine {
        GradingEngine {
            inner: Arc::new(EngineInner {
                assessments: self.assessments,
                questions: self.questions,
                submissions: self.submissions,
                clock: self.clock,
                notifier: self.notifier,
                matcher: self.matcher,
                settings: self.settings,
            }),
        }
    }
}

/// Conflicts that escape a retry loop are reported with zero retries.
pub(crate) fn map_store_error(err: StoreError, kind: &str, id: &str) -> EngineError {
    match err {
        StoreError::NotFound => EngineError::not_found(kind, id),
        StoreError::Conflict => EngineError::StorageConflict { retries: 0 },
        StoreError::Backend(err) => EngineError::Internal(err.context(format!("{kind} '{id}'"))),
    }
}

pub(crate) fn record_conflict(operation: &'static str, submission_id: &str, attempt: u32) {
    tracing::debug!(operation, submission_id, attempt, "Optimistic write lost, retrying");
    metrics::counter!("storage_conflicts_retried_total", "operation" => operation).increment(1);
}
