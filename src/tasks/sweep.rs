use anyhow::{Context, Result};

use crate::db::types::SubmissionStatus;
use crate::services::engine::GradingEngine;

const SWEEP_BATCH_SIZE: i64 = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub finalized: usize,
    /// Lost the race to the student or another sweeper.
    pub skipped: usize,
    pub failed: usize,
}

/// Force-finalizes in-progress attempts whose deadline has passed.
pub async fn close_expired_submissions(engine: &GradingEngine) -> Result<SweepReport> {
    let now = engine.now();
    let expired = engine
        .submission_store()
        .list_expired_in_progress(now, SWEEP_BATCH_SIZE)
        .await
        .context("Failed to fetch expired submissions")?;

    let mut report = SweepReport { scanned: expired.len(), ..SweepReport::default() };
    for submission in expired {
        match engine.finalize_expired(&submission.id).await {
            Ok(outcome) if outcome.was_finalized() => report.finalized += 1,
            Ok(_) => report.skipped += 1,
            Err(err) if err.is_benign() => report.skipped += 1,
            Err(err) if err.is_transient() => {
                report.skipped += 1;
                tracing::warn!(submission_id = %submission.id, error = %err, "Expired submission left for the next sweep");
            }
            Err(err) => {
                report.failed += 1;
                tracing::error!(submission_id = %submission.id, error = %err, "Failed to finalize expired submission");
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        finalized = report.finalized,
        skipped = report.skipped,
        failed = report.failed,
        "Closed expired submissions"
    );
    metrics::counter!("expired_submissions_finalized_total").increment(report.finalized as u64);
    Ok(report)
}

/// Re-runs evaluation for submissions left in SUBMITTED by an interrupted finalize.
pub async fn recover_submitted(engine: &GradingEngine) -> Result<SweepReport> {
    let stuck = engine
        .submission_store()
        .list_by_status(SubmissionStatus::Submitted, SWEEP_BATCH_SIZE)
        .await
        .context("Failed to fetch submitted submissions")?;

    let mut report = SweepReport { scanned: stuck.len(), ..SweepReport::default() };
    for submission in stuck {
        match engine.evaluate_all(&submission.id).await {
            Ok(evaluated) if evaluated.status != SubmissionStatus::Submitted => report.finalized += 1,
            Ok(_) => report.skipped += 1,
            Err(err) if err.is_transient() => {
                report.skipped += 1;
                tracing::warn!(submission_id = %submission.id, error = %err, "Submitted submission left for the next recovery");
            }
            Err(err) => {
                report.failed += 1;
                tracing::error!(submission_id = %submission.id, error = %err, "Failed to evaluate submitted submission");
            }
        }
    }

    if report.scanned > 0 {
        tracing::info!(
            recovered = report.finalized,
            failed = report.failed,
            "Recovered submitted submissions"
        );
    }
    Ok(report)
}
