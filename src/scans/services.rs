use serde::Deserialize;
use time::{Date, Duration, OffsetDateTime, Time};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clients::ai::{complete_json, AiClient, CompletionRequest, Message};
use crate::error::{AppError, AppResult};
use crate::images::services::DecodedImage;
use crate::nutrition::{resolver, FoodItemNutrition, Nutrients, NutritionSources};
use crate::state::AppState;

const MAX_ITEMS: usize = 8;
const DEFAULT_PORTION_G: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct Identification {
    #[serde(default)]
    items: Vec<IdentifiedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifiedItem {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "portion_grams", alias = "grams")]
    portion_grams: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TipReply {
    #[serde(alias = "health_tip")]
    health_tip: String,
    #[serde(default, alias = "quick_advice")]
    quick_advice: String,
}

/// Result of the food photo pipeline, before it is stored.
#[derive(Debug, Clone)]
pub struct FoodAnalysis {
    pub food_name: String,
    pub totals: Nutrients,
    pub health_tip: String,
    pub quick_advice: String,
    pub items: Vec<FoodItemNutrition>,
    pub is_multi_item: bool,
}

const IDENTIFY_PROMPT: &str = "You identify foods in photos for a nutrition tracker. \
Reply with JSON only: {\"items\": [{\"name\": string, \"portionGrams\": number}]}. \
List each distinct food once using a common English name and estimate the visible \
portion in grams. If the photo contains no food, reply {\"items\": []}.";

const TIP_PROMPT: &str = "You are a friendly nutritionist. Given a meal and its nutrition, \
reply with JSON only: {\"healthTip\": string, \"quickAdvice\": string}. healthTip is two \
or three sentences about this meal; quickAdvice is one short actionable line.";

fn portion(grams: Option<f64>) -> f64 {
    match grams {
        Some(g) if g.is_finite() && g > 0.0 => g.min(2000.0),
        _ => DEFAULT_PORTION_G,
    }
}

pub(crate) fn plate_name(items: &[FoodItemNutrition]) -> String {
    items
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_meal(items: &[FoodItemNutrition], totals: &Nutrients) -> String {
    let mut out = String::from("Meal:\n");
    for i in items {
        out.push_str(&format!(
            "- {} ({} g): {} kcal, {} g protein, {} g fat, {} g carbs, {} g fiber\n",
            i.name, i.portion_grams, i.calories, i.protein, i.fat, i.carbs, i.fiber
        ));
    }
    out.push_str(&format!(
        "Total: {} kcal, {} g protein, {} g fat, {} g carbs, {} g fiber",
        totals.calories, totals.protein, totals.fat, totals.carbs, totals.fiber
    ));
    out
}

/// Vision call, per-item nutrition lookup, then a tip over the totals.
#[instrument(skip_all)]
pub async fn analyze_food_image(
    ai: &dyn AiClient,
    sources: &NutritionSources<'_>,
    image: &DecodedImage,
) -> AppResult<FoodAnalysis> {
    let identify = CompletionRequest {
        messages: vec![
            Message::system(IDENTIFY_PROMPT),
            Message::user("Identify the foods in this photo.").with_image(image.inline()),
        ],
        temperature: Some(0.2),
        ..Default::default()
    };
    let found: Identification = complete_json(ai, identify).await?;

    let identified: Vec<(String, f64)> = found
        .items
        .into_iter()
        .map(|i| (i.name.trim().to_string(), portion(i.portion_grams)))
        .filter(|(name, _)| !name.is_empty())
        .take(MAX_ITEMS)
        .collect();
    if identified.is_empty() {
        return Err(AppError::Unprocessable(
            "No food detected in the image, please try another photo".into(),
        ));
    }

    let mut items = Vec::with_capacity(identified.len());
    for (name, grams) in &identified {
        items.push(resolver::resolve_item(sources, name, *grams).await?);
    }
    let totals = items.iter().map(FoodItemNutrition::nutrients).sum::<Nutrients>().rounded();

    let tip_req = CompletionRequest {
        messages: vec![
            Message::system(TIP_PROMPT),
            Message::user(describe_meal(&items, &totals)),
        ],
        temperature: Some(0.5),
        ..Default::default()
    };
    let tip: TipReply = complete_json(ai, tip_req).await?;

    Ok(FoodAnalysis {
        food_name: plate_name(&items),
        totals,
        health_tip: tip.health_tip,
        quick_advice: tip.quick_advice,
        is_multi_item: items.len() > 1,
        items,
    })
}

/// `[start, end)` of a UTC calendar day.
pub fn utc_day_bounds(date: Date) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.with_time(Time::MIDNIGHT).assume_utc();
    (start, start + Duration::days(1))
}

const QUOTA_REACHED: &str = "Daily free scan limit reached, upgrade to premium for unlimited scans";

/// The free scan taken for a request, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanQuota {
    Premium,
    Free { day: Date },
}

/// Premium accounts scan freely; free ones consume one of the day's scans up front.
pub async fn claim_scan_quota(st: &AppState, user_id: Uuid) -> AppResult<ScanQuota> {
    let now = OffsetDateTime::now_utc();
    let premium = st
        .payment_store
        .get_subscription(user_id)
        .await?
        .map(|s| s.is_active(now))
        .unwrap_or(false);
    if premium {
        return Ok(ScanQuota::Premium);
    }

    let day = now.date();
    let limit = st.config.limits.free_daily_scans;
    if limit <= 0 || !st.scans.claim_free_scan(user_id, day, limit).await? {
        info!(%user_id, limit, "free scan quota reached");
        return Err(AppError::PaymentRequired(QUOTA_REACHED.into()));
    }
    Ok(ScanQuota::Free { day })
}

/// Hands the free scan back when the request failed before anything was stored.
pub async fn release_scan_quota(st: &AppState, user_id: Uuid, quota: ScanQuota) {
    if let ScanQuota::Free { day } = quota {
        if let Err(e) = st.scans.release_free_scan(user_id, day).await {
            warn!(error = %e, %user_id, "could not release free scan");
        }
    }
}
