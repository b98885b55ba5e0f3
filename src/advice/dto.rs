use serde::{Deserialize, Serialize};

use crate::scans::dto::Remaining;

#[derive(Debug, Default, Deserialize)]
pub struct ConditionAdviceRequest {
    pub condition: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionAdvice {
    #[serde(default)]
    pub condition: String,
    #[serde(default, alias = "foods_to_eat")]
    pub foods_to_eat: Vec<String>,
    #[serde(default, alias = "foods_to_avoid")]
    pub foods_to_avoid: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "dinner" => Some(Self::Dinner),
            "snack" | "snacks" => Some(Self::Snack),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsRequest {
    #[serde(alias = "meal_type")]
    pub meal_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecommendation {
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecommendationReply {
    #[serde(default)]
    pub recommendations: Vec<FoodRecommendation>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub remaining: Remaining,
    pub recommendations: Vec<FoodRecommendation>,
}
