use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use super::NutrientsPer100g;

/// Curated local nutrition table, consulted before any external lookup.
#[async_trait]
pub trait FoodTable: Send + Sync {
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>>;
}

pub struct PgFoodTable {
    db: PgPool,
}

impl PgFoodTable {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct FoodItemRow {
    calories_per_100g: f64,
    protein_per_100g: f64,
    fat_per_100g: f64,
    carbs_per_100g: f64,
    fiber_per_100g: f64,
}

#[async_trait]
impl FoodTable for PgFoodTable {
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>> {
        let key = name.trim().to_lowercase();
        let row = sqlx::query_as::<_, FoodItemRow>(
            r#"
            SELECT calories_per_100g, protein_per_100g, fat_per_100g,
                   carbs_per_100g, fiber_per_100g
              FROM food_items
             WHERE name = $1 OR $1 = ANY(aliases)
             LIMIT 1
            "#,
        )
        .bind(&key)
        .fetch_optional(&self.db)
        .await
        .context("lookup food_items")?;

        Ok(row.map(|r| NutrientsPer100g {
            calories: r.calories_per_100g,
            protein: r.protein_per_100g,
            fat: r.fat_per_100g,
            carbs: r.carbs_per_100g,
            fiber: r.fiber_per_100g,
        }))
    }
}
