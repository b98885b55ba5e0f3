use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::services::FoodAnalysis;
use crate::nutrition::{FoodItemNutrition, Nutrients};

#[derive(Debug, Clone, FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub health_tip: Option<String>,
    pub quick_advice: Option<String>,
    pub items: Json<Vec<FoodItemNutrition>>,
    pub is_multi_item: bool,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
}

impl ScanRecord {
    pub fn nutrients(&self) -> Nutrients {
        Nutrients {
            calories: self.calories,
            protein: self.protein,
            fat: self.fat,
            carbs: self.carbs,
            fiber: self.fiber,
        }
    }
}

const COLUMNS: &str = "id, user_id, food_name, calories, protein, fat, carbs, fiber, \
                       health_tip, quick_advice, items, is_multi_item, image_key, created_at";

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    a: &FoodAnalysis,
    image_key: Option<&str>,
) -> anyhow::Result<ScanRecord> {
    sqlx::query_as::<_, ScanRecord>(&format!(
        r#"
        INSERT INTO scan_records (id, user_id, food_name, calories, protein, fat, carbs, fiber,
                                  health_tip, quick_advice, items, is_multi_item, image_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&a.food_name)
    .bind(a.totals.calories)
    .bind(a.totals.protein)
    .bind(a.totals.fat)
    .bind(a.totals.carbs)
    .bind(a.totals.fiber)
    .bind(&a.health_tip)
    .bind(&a.quick_advice)
    .bind(Json(&a.items))
    .bind(a.is_multi_item)
    .bind(image_key)
    .fetch_one(db)
    .await
    .context("insert scan record")
}

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<ScanRecord>> {
    sqlx::query_as::<_, ScanRecord>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM scan_records
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
    .context("list scans")
}

pub async fn get(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<ScanRecord>> {
    sqlx::query_as::<_, ScanRecord>(&format!(
        "SELECT {COLUMNS} FROM scan_records WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get scan")
}

/// Deletes the scan; `Some(image_key)` when a row was removed.
pub async fn delete(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        r#"DELETE FROM scan_records WHERE id = $1 AND user_id = $2 RETURNING image_key"#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("delete scan")?;
    Ok(row.map(|(key,)| key))
}

/// Sum of nutrients and number of scans in `[from, to)`.
pub async fn totals_between(
    db: &PgPool,
    user_id: Uuid,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> anyhow::Result<(Nutrients, i64)> {
    let (calories, protein, fat, carbs, fiber, count): (f64, f64, f64, f64, f64, i64) =
        sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(calories), 0)::float8,
                   COALESCE(SUM(protein), 0)::float8,
                   COALESCE(SUM(fat), 0)::float8,
                   COALESCE(SUM(carbs), 0)::float8,
                   COALESCE(SUM(fiber), 0)::float8,
                   COUNT(*)
              FROM scan_records
             WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(db)
        .await
        .context("sum scans")?;
    Ok((
        Nutrients { calories, protein, fat, carbs, fiber },
        count,
    ))
}

/// The write side of scanning: free-tier usage, storing and removing scans.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Takes one free scan for `day`. False once `limit` scans were taken that day.
    /// `limit` must be positive.
    async fn claim_free_scan(&self, user_id: Uuid, day: Date, limit: i64) -> anyhow::Result<bool>;
    /// Returns a claimed scan whose analysis never got stored.
    async fn release_free_scan(&self, user_id: Uuid, day: Date) -> anyhow::Result<()>;
    async fn insert(
        &self,
        user_id: Uuid,
        analysis: &FoodAnalysis,
        image_key: Option<&str>,
    ) -> anyhow::Result<ScanRecord>;
    /// `Some(image_key)` when a row was removed. Usage already counted stays counted.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Option<String>>>;
}

pub struct PgScanStore {
    db: PgPool,
}

impl PgScanStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn claim_free_scan(&self, user_id: Uuid, day: Date, limit: i64) -> anyhow::Result<bool> {
        // The conditional upsert serializes concurrent claims on the row.
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO scan_usage (user_id, day, used)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, day) DO UPDATE
               SET used = scan_usage.used + 1
             WHERE scan_usage.used < $3
            RETURNING used
            "#,
        )
        .bind(user_id)
        .bind(day)
        .bind(limit)
        .fetch_optional(&self.db)
        .await
        .context("claim free scan")?;
        Ok(row.is_some())
    }

    async fn release_free_scan(&self, user_id: Uuid, day: Date) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_usage
               SET used = used - 1
             WHERE user_id = $1 AND day = $2 AND used > 0
            "#,
        )
        .bind(user_id)
        .bind(day)
        .execute(&self.db)
        .await
        .context("release free scan")?;
        Ok(())
    }

    async fn insert(
        &self,
        user_id: Uuid,
        analysis: &FoodAnalysis,
        image_key: Option<&str>,
    ) -> anyhow::Result<ScanRecord> {
        insert(&self.db, user_id, analysis, image_key).await
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Option<String>>> {
        delete(&self.db, user_id, id).await
    }
}
