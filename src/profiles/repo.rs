use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<String>,
    pub weight_goal: Option<String>,
    pub dietary_preference: Option<String>,
    pub health_conditions: Vec<String>,
    pub preferred_language: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated values for an upsert.
#[derive(Debug, Clone, Default)]
pub struct ProfileInput {
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<String>,
    pub weight_goal: Option<String>,
    pub dietary_preference: Option<String>,
    pub health_conditions: Vec<String>,
    pub preferred_language: Option<String>,
}

const COLUMNS: &str = "user_id, full_name, age, gender, height_cm, weight_kg, activity_level, \
                       weight_goal, dietary_preference, health_conditions, preferred_language, updated_at";

pub async fn get(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {COLUMNS} FROM user_profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get profile")
}

pub async fn upsert(db: &PgPool, user_id: Uuid, p: &ProfileInput) -> anyhow::Result<Profile> {
    sqlx::query_as::<_, Profile>(&format!(
        r#"
        INSERT INTO user_profiles (user_id, full_name, age, gender, height_cm, weight_kg,
                                   activity_level, weight_goal, dietary_preference,
                                   health_conditions, preferred_language, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
        ON CONFLICT (user_id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            age = EXCLUDED.age,
            gender = EXCLUDED.gender,
            height_cm = EXCLUDED.height_cm,
            weight_kg = EXCLUDED.weight_kg,
            activity_level = EXCLUDED.activity_level,
            weight_goal = EXCLUDED.weight_goal,
            dietary_preference = EXCLUDED.dietary_preference,
            health_conditions = EXCLUDED.health_conditions,
            preferred_language = EXCLUDED.preferred_language,
            updated_at = now()
        RETURNING {COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&p.full_name)
    .bind(p.age)
    .bind(&p.gender)
    .bind(p.height_cm)
    .bind(p.weight_kg)
    .bind(&p.activity_level)
    .bind(&p.weight_goal)
    .bind(&p.dietary_preference)
    .bind(&p.health_conditions)
    .bind(&p.preferred_language)
    .fetch_one(db)
    .await
    .context("upsert profile")
}
