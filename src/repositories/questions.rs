use sqlx::PgPool;

use crate::db::models::{question_kind_tag, QuestionOptionRow, QuestionRow};
use crate::schemas::assessment::{Question, QuestionKind};

pub const COLUMNS: &str = "\
    id, assessment_id, kind, prompt, points, order_index, model_answer, created_at";

pub const OPTION_COLUMNS: &str = "id, question_id, label, is_correct, order_index";

pub async fn list_by_assessment(
    pool: &PgPool,
    assessment_id: &str,
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE assessment_id = $1 ORDER BY order_index, id"
    ))
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}

pub async fn list_options_by_assessment(
    pool: &PgPool,
    assessment_id: &str,
) -> Result<Vec<QuestionOptionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionOptionRow>(
        "SELECT o.id, o.question_id, o.label, o.is_correct, o.order_index
         FROM question_options o
         JOIN questions q ON q.id = o.question_id
         WHERE q.assessment_id = $1
         ORDER BY o.question_id, o.order_index",
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}

/// Replaces a question together with its options in one transaction.
pub async fn replace(pool: &PgPool, question: &Question) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(&question.id)
        .execute(&mut *tx)
        .await?;

    let model_answer = match &question.kind {
        QuestionKind::ShortAnswer { model_answer } => model_answer.clone(),
        _ => None,
    };

    sqlx::query(&format!(
        "INSERT INTO questions ({COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,now())"
    ))
    .bind(&question.id)
    .bind(&question.assessment_id)
    .bind(question_kind_tag(&question.kind))
    .bind(&question.prompt)
    .bind(question.points)
    .bind(question.order_index)
    .bind(model_answer)
    .execute(&mut *tx)
    .await?;

    if let QuestionKind::MultipleChoice { options } | QuestionKind::TrueFalse { options } =
        &question.kind
    {
        for (index, option) in options.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO question_options ({OPTION_COLUMNS}) VALUES ($1,$2,$3,$4,$5)"
            ))
            .bind(&option.id)
            .bind(&question.id)
            .bind(&option.label)
            .bind(option.is_correct)
            .bind(index as i32)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await
}
