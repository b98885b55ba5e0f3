//! Nutrient values and the tiered lookup that resolves them for a food name.

pub mod repo;
pub mod resolver;

use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

pub use repo::{FoodTable, PgFoodTable};
pub use resolver::NutritionSources;

/// Reference values per 100 g of a food.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientsPer100g {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

impl NutrientsPer100g {
    pub fn for_portion(&self, grams: f64) -> Nutrients {
        let f = grams / 100.0;
        Nutrients {
            calories: self.calories * f,
            protein: self.protein * f,
            fat: self.fat * f,
            carbs: self.carbs * f,
            fiber: self.fiber * f,
        }
    }
}

/// Absolute amounts: kcal and grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

impl Nutrients {
    pub fn rounded(self) -> Self {
        Self {
            calories: round1(self.calories),
            protein: round1(self.protein),
            fat: round1(self.fat),
            carbs: round1(self.carbs),
            fiber: round1(self.fiber),
        }
    }
}

impl Add for Nutrients {
    type Output = Nutrients;

    fn add(self, o: Nutrients) -> Nutrients {
        Nutrients {
            calories: self.calories + o.calories,
            protein: self.protein + o.protein,
            fat: self.fat + o.fat,
            carbs: self.carbs + o.carbs,
            fiber: self.fiber + o.fiber,
        }
    }
}

impl Sum for Nutrients {
    fn sum<I: Iterator<Item = Nutrients>>(iter: I) -> Self {
        iter.fold(Nutrients::default(), Add::add)
    }
}

/// Which tier produced an item's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutritionSource {
    Local,
    External,
    AiEstimate,
}

/// One resolved food on a plate, as returned to clients and stored with a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItemNutrition {
    pub name: String,
    pub portion_grams: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub source: NutritionSource,
}

impl FoodItemNutrition {
    pub fn nutrients(&self) -> Nutrients {
        Nutrients {
            calories: self.calories,
            protein: self.protein,
            fat: self.fat,
            carbs: self.carbs,
            fiber: self.fiber,
        }
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
