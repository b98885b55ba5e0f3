use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const STORY_TTL: Duration = Duration::hours(24);
pub const FEED_LIMIT: i64 = 50;

#[derive(Debug, Clone, FromRow)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scan_id: Uuid,
    pub caption: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// A live story joined with its scan and the author's display name.
#[derive(Debug, Clone, FromRow)]
pub struct FeedRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author_name: Option<String>,
    pub scan_id: Uuid,
    pub caption: Option<String>,
    pub food_name: String,
    pub calories: f64,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    scan_id: Uuid,
    caption: Option<&str>,
    now: OffsetDateTime,
) -> anyhow::Result<Story> {
    sqlx::query_as::<_, Story>(
        r#"
        INSERT INTO food_stories (id, user_id, scan_id, caption, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, scan_id, caption, created_at, expires_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(scan_id)
    .bind(caption)
    .bind(now)
    .bind(now + STORY_TTL)
    .fetch_one(db)
    .await
    .context("insert story")
}

pub async fn live_feed(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<Vec<FeedRow>> {
    sqlx::query_as::<_, FeedRow>(
        r#"
        SELECT s.id, s.user_id, p.full_name AS author_name, s.scan_id, s.caption,
               r.food_name, r.calories, r.image_key, s.created_at, s.expires_at
          FROM food_stories s
          JOIN scan_records r ON r.id = s.scan_id
          LEFT JOIN user_profiles p ON p.user_id = s.user_id
         WHERE s.expires_at > $1
         ORDER BY s.created_at DESC
         LIMIT $2
        "#,
    )
    .bind(now)
    .bind(FEED_LIMIT)
    .fetch_all(db)
    .await
    .context("load story feed")
}

pub async fn delete(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM food_stories WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete story")?;
    Ok(res.rows_affected() > 0)
}
