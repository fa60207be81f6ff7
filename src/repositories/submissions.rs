use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::models::SubmissionRow;
use crate::db::types::SubmissionStatus;
use crate::schemas::submission::Submission;

pub const COLUMNS: &str = "\
    id, assessment_id, student_id, attempt_number, status, answers, started_at, expires_at, \
    submitted_at, graded_at, obtained_points, total_points, percentage, provisional, passed, \
    feedback, finalize_mode, results_released_at, version, created_at, updated_at";

pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Returns `false` when a unique constraint swallowed the insert.
pub async fn create_if_absent(pool: &PgPool, submission: &Submission) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO submissions (
            id, assessment_id, student_id, attempt_number, status, answers,
            started_at, expires_at, version, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,0,now(),now())
        ON CONFLICT DO NOTHING",
    )
    .bind(&submission.id)
    .bind(&submission.assessment_id)
    .bind(&submission.student_id)
    .bind(submission.attempt_number)
    .bind(submission.status)
    .bind(Json(&submission.answers))
    .bind(submission.started_at)
    .bind(submission.expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compare-and-swap on `version`; `None` means the row moved on or does not exist.
pub async fn update_if_version(
    pool: &PgPool,
    submission: &Submission,
    expected_version: i64,
) -> Result<Option<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "UPDATE submissions
         SET status = $1,
             answers = $2,
             expires_at = $3,
             submitted_at = $4,
             graded_at = $5,
             obtained_points = $6,
             total_points = $7,
             percentage = $8,
             provisional = $9,
             passed = $10,
             feedback = $11,
             finalize_mode = $12,
             results_released_at = $13,
             version = version + 1,
             updated_at = now()
         WHERE id = $14 AND version = $15
         RETURNING {COLUMNS}"
    ))
    .bind(submission.status)
    .bind(Json(&submission.answers))
    .bind(submission.expires_at)
    .bind(submission.submitted_at)
    .bind(submission.graded_at)
    .bind(submission.obtained_points)
    .bind(submission.total_points)
    .bind(submission.percentage)
    .bind(submission.provisional)
    .bind(submission.passed)
    .bind(&submission.feedback)
    .bind(submission.finalize_mode)
    .bind(submission.results_released_at)
    .bind(&submission.id)
    .bind(expected_version)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_student_and_assessment(
    pool: &PgPool,
    student_id: &str,
    assessment_id: &str,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE student_id = $1 AND assessment_id = $2
         ORDER BY attempt_number"
    ))
    .bind(student_id)
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}

pub async fn list_by_assessment(
    pool: &PgPool,
    assessment_id: &str,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE assessment_id = $1
         ORDER BY student_id, attempt_number"
    ))
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}

pub async fn list_by_status(
    pool: &PgPool,
    status: SubmissionStatus,
    limit: i64,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE status = $1
         ORDER BY updated_at
         LIMIT $2"
    ))
    .bind(status)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
}

pub async fn list_expired_in_progress(
    pool: &PgPool,
    now: OffsetDateTime,
    limit: i64,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE status = $1
           AND expires_at IS NOT NULL
           AND expires_at < $2
         ORDER BY expires_at
         LIMIT $3"
    ))
    .bind(SubmissionStatus::InProgress)
    .bind(now)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
}
