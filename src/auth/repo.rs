use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Embedded in every token; a reset bumps it.
    pub token_version: i32,
    pub created_at: OffsetDateTime,
}

/// Account persistence. Emails passed in must already be normalized.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>>;
    /// `None` when the email is already taken.
    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<Account>>;
    /// Replaces the hash only while the account is still at `token_version`,
    /// and moves it to the next version. False when the version has moved on.
    async fn reset_password(
        &self,
        id: Uuid,
        token_version: i32,
        password_hash: &str,
    ) -> anyhow::Result<bool>;
}

pub struct PgAccounts {
    db: PgPool,
}

impl PgAccounts {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const COLUMNS: &str = "id, email, password_hash, token_version, created_at";

#[async_trait]
impl AccountStore for PgAccounts {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        sqlx::query_as::<_, Account>(&format!("SELECT {COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        sqlx::query_as::<_, Account>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<Account>> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")
    }

    async fn reset_password(
        &self,
        id: Uuid,
        token_version: i32,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $3, token_version = token_version + 1
             WHERE id = $1 AND token_version = $2
            "#,
        )
        .bind(id)
        .bind(token_version)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("reset password")?;
        Ok(res.rows_affected() == 1)
    }
}
