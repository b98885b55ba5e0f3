use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub has_image: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// Last `limit` messages in chronological order.
pub async fn recent(db: &PgPool, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<ChatMessage>> {
    let mut rows = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, role, content, has_image, created_at
          FROM chat_messages
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("load chat history")?;
    rows.reverse();
    Ok(rows)
}

/// Stores the user's turn and the assistant's reply together or not at all.
pub async fn insert_exchange(
    db: &PgPool,
    user_id: Uuid,
    question: &str,
    has_image: bool,
    reply: &str,
) -> anyhow::Result<()> {
    let mut tx = db.begin().await.context("begin chat tx")?;
    for (role, content, image) in [(ROLE_USER, question, has_image), (ROLE_ASSISTANT, reply, false)] {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, user_id, role, content, has_image)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role)
        .bind(content)
        .bind(image)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert {role} chat message"))?;
    }
    tx.commit().await.context("commit chat tx")?;
    Ok(())
}

pub async fn clear(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM chat_messages WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .context("clear chat history")?;
    Ok(res.rows_affected())
}
