use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::ScanRecord;
use crate::goals::Goals;
use crate::nutrition::{FoodItemNutrition, Nutrients};

#[derive(Debug, Deserialize)]
pub struct AnalyzeFoodRequest {
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFoodResponse {
    pub scan_id: Uuid,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub health_tip: String,
    pub quick_advice: String,
    pub items: Vec<FoodItemNutrition>,
    pub is_multi_item: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub id: Uuid,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub health_tip: Option<String>,
    pub quick_advice: Option<String>,
    pub items: Vec<FoodItemNutrition>,
    pub is_multi_item: bool,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ScanResponse {
    pub fn from_record(r: ScanRecord, image_url: Option<String>) -> Self {
        Self {
            id: r.id,
            food_name: r.food_name,
            calories: r.calories,
            protein: r.protein,
            fat: r.fat,
            carbs: r.carbs,
            fiber: r.fiber,
            health_tip: r.health_tip,
            quick_advice: r.quick_advice,
            items: r.items.0,
            is_multi_item: r.is_multi_item,
            image_url,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: String,
    pub consumed: Nutrients,
    pub goals: Goals,
    pub remaining: Remaining,
    pub scan_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Remaining {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

impl Remaining {
    /// Goal minus consumption, never below zero.
    pub fn of(goals: &Goals, consumed: &Nutrients) -> Self {
        let left = |goal: f64, used: f64| crate::nutrition::round1((goal - used).max(0.0));
        Self {
            calories: left(goals.daily_calories, consumed.calories),
            protein: left(goals.protein_g, consumed.protein),
            fat: left(goals.fat_g, consumed.fat),
            carbs: left(goals.carbs_g, consumed.carbs),
            fiber: left(goals.fiber_g, consumed.fiber),
        }
    }
}
