use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::Goals;

pub async fn get(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Goals>> {
    sqlx::query_as::<_, Goals>(
        r#"
        SELECT daily_calories, protein_g, carbs_g, fat_g, fiber_g, water_ml
          FROM nutrition_goals
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get goals")
}

pub async fn upsert(db: &PgPool, user_id: Uuid, g: &Goals) -> anyhow::Result<Goals> {
    sqlx::query_as::<_, Goals>(
        r#"
        INSERT INTO nutrition_goals (user_id, daily_calories, protein_g, carbs_g, fat_g,
                                     fiber_g, water_ml, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        ON CONFLICT (user_id) DO UPDATE SET
            daily_calories = EXCLUDED.daily_calories,
            protein_g = EXCLUDED.protein_g,
            carbs_g = EXCLUDED.carbs_g,
            fat_g = EXCLUDED.fat_g,
            fiber_g = EXCLUDED.fiber_g,
            water_ml = EXCLUDED.water_ml,
            updated_at = now()
        RETURNING daily_calories, protein_g, carbs_g, fat_g, fiber_g, water_ml
        "#,
    )
    .bind(user_id)
    .bind(g.daily_calories)
    .bind(g.protein_g)
    .bind(g.carbs_g)
    .bind(g.fat_g)
    .bind(g.fiber_g)
    .bind(g.water_ml)
    .fetch_one(db)
    .await
    .context("upsert goals")
}
