use serde::Deserialize;

use crate::error::{AppError, AppResult};

use super::repo::ProfileInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "sedentary" => Some(Self::Sedentary),
            "light" | "lightly_active" => Some(Self::Light),
            "moderate" | "moderately_active" => Some(Self::Moderate),
            "active" => Some(Self::Active),
            "very_active" | "extra_active" => Some(Self::VeryActive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sedentary => "sedentary",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Active => "active",
            Self::VeryActive => "very_active",
        }
    }

    /// TDEE multiplier applied to BMR.
    pub fn factor(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightGoal {
    Lose,
    Maintain,
    Gain,
}

impl WeightGoal {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lose" | "weight_loss" => Some(Self::Lose),
            "maintain" | "maintenance" => Some(Self::Maintain),
            "gain" | "muscle_gain" => Some(Self::Gain),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lose => "lose",
            Self::Maintain => "maintain",
            Self::Gain => "gain",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<String>,
    pub weight_goal: Option<String>,
    pub dietary_preference: Option<String>,
    #[serde(default)]
    pub health_conditions: Vec<String>,
    pub preferred_language: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_range<T: PartialOrd + Copy>(field: &str, v: Option<T>, lo: T, hi: T) -> AppResult<Option<T>> {
    match v {
        Some(x) if x < lo || x > hi => Err(AppError::bad_request(format!("{field} is out of range"))),
        other => Ok(other),
    }
}

fn parse_enum<E>(
    field: &str,
    v: Option<String>,
    parse: impl Fn(&str) -> Option<E>,
    as_str: impl Fn(E) -> &'static str,
) -> AppResult<Option<String>> {
    match non_empty(v) {
        None => Ok(None),
        Some(s) => parse(&s)
            .map(|e| Some(as_str(e).to_string()))
            .ok_or_else(|| AppError::bad_request(format!("Invalid {field}"))),
    }
}

impl UpdateProfileRequest {
    pub fn validate(self) -> AppResult<ProfileInput> {
        let health_conditions = self
            .health_conditions
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>();
        if health_conditions.len() > 20 {
            return Err(AppError::bad_request("Too many health conditions"));
        }

        Ok(ProfileInput {
            full_name: non_empty(self.full_name),
            age: check_range("age", self.age, 10, 120)?,
            gender: parse_enum("gender", self.gender, Gender::parse, Gender::as_str)?,
            height_cm: check_range("heightCm", self.height_cm, 50.0, 272.0)?,
            weight_kg: check_range("weightKg", self.weight_kg, 20.0, 500.0)?,
            activity_level: parse_enum(
                "activityLevel",
                self.activity_level,
                ActivityLevel::parse,
                ActivityLevel::as_str,
            )?,
            weight_goal: parse_enum("weightGoal", self.weight_goal, WeightGoal::parse, WeightGoal::as_str)?,
            dietary_preference: non_empty(self.dietary_preference),
            health_conditions,
            preferred_language: non_empty(self.preferred_language).map(|l| l.to_lowercase()),
        })
    }
}
