use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::UsdaConfig;
use crate::nutrition::NutrientsPer100g;

/// External nutrition database lookup.
#[async_trait]
pub trait NutritionApi: Send + Sync {
    async fn search(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>>;
}

/// USDA FoodData Central client.
pub struct UsdaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UsdaClient {
    pub fn new(http: reqwest::Client, cfg: &UsdaConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<UsdaFood>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsdaFood {
    description: String,
    #[serde(default)]
    food_nutrients: Vec<UsdaNutrient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsdaNutrient {
    nutrient_number: Option<String>,
    value: Option<f64>,
}

// FoodData Central nutrient numbers.
const ENERGY_KCAL: &str = "208";
const PROTEIN: &str = "203";
const TOTAL_FAT: &str = "204";
const CARBOHYDRATE: &str = "205";
const FIBER: &str = "291";

fn nutrients_from_food(food: &UsdaFood) -> Option<NutrientsPer100g> {
    let find = |number: &str| {
        food.food_nutrients
            .iter()
            .find(|n| n.nutrient_number.as_deref() == Some(number))
            .and_then(|n| n.value)
    };
    let calories = find(ENERGY_KCAL)?;
    Some(NutrientsPer100g {
        calories,
        protein: find(PROTEIN).unwrap_or(0.0),
        fat: find(TOTAL_FAT).unwrap_or(0.0),
        carbs: find(CARBOHYDRATE).unwrap_or(0.0),
        fiber: find(FIBER).unwrap_or(0.0),
    })
}

#[async_trait]
impl NutritionApi for UsdaClient {
    async fn search(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>> {
        let resp = self
            .http
            .get(format!("{}/foods/search", self.base_url))
            .query(&[
                ("query", name),
                ("pageSize", "1"),
                ("dataType", "Foundation,SR Legacy,Survey (FNDDS)"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("usda search request")?
            .error_for_status()
            .context("usda search status")?;

        let body: SearchResponse = resp.json().await.context("usda search body")?;
        let first = body.foods.first();
        let found = first.and_then(nutrients_from_food);
        debug!(
            query = name,
            matched = ?first.map(|f| f.description.as_str()),
            hit = found.is_some(),
            "usda lookup"
        );
        Ok(found)
    }
}
