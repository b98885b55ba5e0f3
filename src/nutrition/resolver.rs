use serde::Deserialize;
use tracing::{debug, warn};

use super::{FoodItemNutrition, FoodTable, NutrientsPer100g, NutritionSource};
use crate::clients::ai::{complete_json, AiClient, CompletionRequest, Message};
use crate::clients::NutritionApi;
use crate::error::AppResult;
use crate::state::AppState;

/// The three lookup tiers, borrowed from whatever owns the clients.
pub struct NutritionSources<'a> {
    pub table: &'a dyn FoodTable,
    pub api: &'a dyn NutritionApi,
    pub ai: &'a dyn AiClient,
}

impl<'a> NutritionSources<'a> {
    pub fn from_state(st: &'a AppState) -> Self {
        Self {
            table: st.food_table.as_ref(),
            api: st.nutrition_api.as_ref(),
            ai: st.ai.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AiEstimate {
    calories: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    fat: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fiber: f64,
}

async fn estimate_with_ai(ai: &dyn AiClient, name: &str) -> AppResult<NutrientsPer100g> {
    let req = CompletionRequest {
        messages: vec![
            Message::system(
                "You are a nutrition database. Reply with JSON only: \
                 {\"calories\": number, \"protein\": number, \"fat\": number, \
                 \"carbs\": number, \"fiber\": number}. Values are per 100 g, \
                 calories in kcal, the rest in grams.",
            ),
            Message::user(format!("Estimate typical nutrition per 100 g of: {name}")),
        ],
        temperature: Some(0.1),
        ..Default::default()
    };
    let e: AiEstimate = complete_json(ai, req).await?;
    Ok(NutrientsPer100g {
        calories: e.calories.max(0.0),
        protein: e.protein.max(0.0),
        fat: e.fat.max(0.0),
        carbs: e.carbs.max(0.0),
        fiber: e.fiber.max(0.0),
    })
}

/// Looks a food up in the local table, then the external API, then asks
/// the model. Failures of the first two tiers count as misses.
pub async fn resolve(
    src: &NutritionSources<'_>,
    name: &str,
) -> AppResult<(NutrientsPer100g, NutritionSource)> {
    match src.table.lookup(name).await {
        Ok(Some(n)) => {
            debug!(food = name, "nutrition from local table");
            return Ok((n, NutritionSource::Local));
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, food = name, "local food table lookup failed"),
    }

    match src.api.search(name).await {
        Ok(Some(n)) => {
            debug!(food = name, "nutrition from external api");
            return Ok((n, NutritionSource::External));
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, food = name, "external nutrition lookup failed"),
    }

    let n = estimate_with_ai(src.ai, name).await?;
    debug!(food = name, "nutrition estimated by ai");
    Ok((n, NutritionSource::AiEstimate))
}

pub async fn resolve_item(
    src: &NutritionSources<'_>,
    name: &str,
    portion_grams: f64,
) -> AppResult<FoodItemNutrition> {
    let (per_100g, source) = resolve(src, name).await?;
    let n = per_100g.for_portion(portion_grams).rounded();
    Ok(FoodItemNutrition {
        name: name.to_string(),
        portion_grams,
        calories: n.calories,
        protein: n.protein,
        fat: n.fat,
        carbs: n.carbs,
        fiber: n.fiber,
        source,
    })
}
