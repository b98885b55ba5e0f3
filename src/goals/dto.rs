use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Daily targets: kcal, grams and millilitres of water.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Goals {
    pub daily_calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub water_ml: f64,
}

impl Goals {
    pub const DEFAULT: Goals = Goals {
        daily_calories: 2000.0,
        protein_g: 50.0,
        carbs_g: 275.0,
        fat_g: 78.0,
        fiber_g: 28.0,
        water_ml: 2000.0,
    };

    pub fn validate(self) -> AppResult<Self> {
        if !(800.0..=10_000.0).contains(&self.daily_calories) {
            return Err(AppError::bad_request("dailyCalories must be between 800 and 10000"));
        }
        let rest = [self.protein_g, self.carbs_g, self.fat_g, self.fiber_g, self.water_ml];
        if rest.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(AppError::bad_request("Goal values must be positive"));
        }
        Ok(self)
    }
}

/// Where the goals in a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalsOrigin {
    Stored,
    Suggested,
    Default,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsResponse {
    #[serde(flatten)]
    pub goals: Goals,
    pub origin: GoalsOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_goals_are_valid() {
        assert!(Goals::DEFAULT.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_calories_and_non_positive_values() {
        let low = Goals { daily_calories: 500.0, ..Goals::DEFAULT };
        assert!(low.validate().is_err());
        let zero_water = Goals { water_ml: 0.0, ..Goals::DEFAULT };
        assert!(zero_water.validate().is_err());
    }

    #[test]
    fn response_flattens_goals() {
        let json = serde_json::to_value(GoalsResponse {
            goals: Goals::DEFAULT,
            origin: GoalsOrigin::Default,
        })
        .unwrap();
        assert_eq!(json["dailyCalories"], 2000.0);
        assert_eq!(json["origin"], "default");
    }
}
