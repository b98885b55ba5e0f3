use anyhow::Context;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::Finding;

#[derive(Debug, Clone, FromRow)]
pub struct MedicalReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub report_type: String,
    pub summary: String,
    pub findings: Json<Vec<Finding>>,
    pub recommendations: Json<Vec<String>>,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
}

pub struct NewReport<'a> {
    pub report_type: &'a str,
    pub summary: &'a str,
    pub findings: &'a [Finding],
    pub recommendations: &'a [String],
    pub image_key: Option<&'a str>,
}

const COLUMNS: &str =
    "id, user_id, report_type, summary, findings, recommendations, image_key, created_at";

pub async fn insert(db: &PgPool, user_id: Uuid, r: NewReport<'_>) -> anyhow::Result<MedicalReport> {
    sqlx::query_as::<_, MedicalReport>(&format!(
        r#"
        INSERT INTO medical_reports (id, user_id, report_type, summary, findings, recommendations, image_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(r.report_type)
    .bind(r.summary)
    .bind(Json(r.findings))
    .bind(Json(r.recommendations))
    .bind(r.image_key)
    .fetch_one(db)
    .await
    .context("insert medical report")
}

/// Newest first.
pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<MedicalReport>> {
    sqlx::query_as::<_, MedicalReport>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM medical_reports
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list medical reports")
}

pub async fn get(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<MedicalReport>> {
    sqlx::query_as::<_, MedicalReport>(&format!(
        "SELECT {COLUMNS} FROM medical_reports WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get medical report")
}

/// `Some(image_key)` when a row was removed.
pub async fn delete(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "DELETE FROM medical_reports WHERE id = $1 AND user_id = $2 RETURNING image_key",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("delete medical report")?;
    Ok(row.map(|(key,)| key))
}
