use std::sync::Arc;

use async_trait::async_trait;

use crate::schemas::submission::Submission;

/// Outbound hook fired once a submission reaches GRADED.
#[async_trait]
pub trait GradedNotifier: Send + Sync {
    async fn on_submission_graded(&self, submission: &Submission) -> anyhow::Result<()>;
}

pub struct NoopNotifier;

#[async_trait]
impl GradedNotifier for NoopNotifier {
    async fn on_submission_graded(&self, _submission: &Submission) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Emits a structured event per graded submission.
pub struct TracingNotifier;

#[async_trait]
impl GradedNotifier for TracingNotifier {
    async fn on_submission_graded(&self, submission: &Submission) -> anyhow::Result<()> {
        tracing::info!(
            submission_id = %submission.id,
            student_id = %submission.student_id,
            assessment_id = %submission.assessment_id,
            obtained_points = submission.obtained_points,
            passed = ?submission.passed,
            "Submission graded"
        );
        Ok(())
    }
}

/// Fire-and-forget; grading is already persisted when this runs.
pub(crate) fn dispatch_graded(notifier: Arc<dyn GradedNotifier>, submission: Submission) {
    tokio::spawn(async move {
        if let Err(err) = notifier.on_submission_graded(&submission).await {
            tracing::warn!(
                submission_id = %submission.id,
                error = %err,
                "Graded notification failed"
            );
        }
    });
}
