use sqlx::PgPool;

use crate::db::models::AssessmentRow;
use crate::schemas::assessment::Assessment;

pub const COLUMNS: &str = "\
    id, title, kind, duration_minutes, total_points, passing_points, start_time, end_time, \
    max_attempts, show_results_immediately, created_at, updated_at";

pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<AssessmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentRow>(&format!("SELECT {COLUMNS} FROM assessments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Upsert used by seeding and by the authoring side of the platform.
pub async fn upsert(pool: &PgPool, assessment: &Assessment) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assessments (
            id, title, kind, duration_minutes, total_points, passing_points,
            start_time, end_time, max_attempts, show_results_immediately
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            kind = EXCLUDED.kind,
            duration_minutes = EXCLUDED.duration_minutes,
            total_points = EXCLUDED.total_points,
            passing_points = EXCLUDED.passing_points,
            start_time = EXCLUDED.start_time,
            end_time = EXCLUDED.end_time,
            max_attempts = EXCLUDED.max_attempts,
            show_results_immediately = EXCLUDED.show_results_immediately,
            updated_at = now()",
    )
    .bind(&assessment.id)
    .bind(&assessment.title)
    .bind(assessment.kind)
    .bind(assessment.duration_minutes)
    .bind(assessment.total_points)
    .bind(assessment.passing_points)
    .bind(assessment.start_time)
    .bind(assessment.end_time)
    .bind(assessment.max_attempts)
    .bind(assessment.show_results_immediately)
    .execute(pool)
    .await?;
    Ok(())
}
