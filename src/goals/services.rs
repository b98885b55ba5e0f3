use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{Goals, GoalsOrigin};
use super::repo;
use crate::nutrition::round1;
use crate::profiles::{self, ActivityLevel, Gender, Profile, WeightGoal};

const MIN_SUGGESTED_KCAL: f64 = 1200.0;

/// Mifflin–St Jeor BMR.
fn bmr(age: i32, gender: Gender, height_cm: f64, weight_kg: f64) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age as f64;
    match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
        Gender::Other => base - 78.0,
    }
}

pub fn suggest(
    age: i32,
    gender: Gender,
    height_cm: f64,
    weight_kg: f64,
    activity: ActivityLevel,
    goal: WeightGoal,
) -> Goals {
    let tdee = bmr(age, gender, height_cm, weight_kg) * activity.factor();
    let calories = match goal {
        WeightGoal::Lose => tdee - 500.0,
        WeightGoal::Maintain => tdee,
        WeightGoal::Gain => tdee + 500.0,
    }
    .max(MIN_SUGGESTED_KCAL)
    .round();

    // 30% protein, 40% carbs, 30% fat
    Goals {
        daily_calories: calories,
        protein_g: round1(calories * 0.30 / 4.0),
        carbs_g: round1(calories * 0.40 / 4.0),
        fat_g: round1(calories * 0.30 / 9.0),
        fiber_g: round1(calories / 1000.0 * 14.0),
        water_ml: (weight_kg * 35.0).round(),
    }
}

/// Needs age, gender, height and weight; activity and goal have defaults.
pub fn suggest_for_profile(p: &Profile) -> Option<Goals> {
    let gender = Gender::parse(p.gender.as_deref()?)?;
    let activity = p
        .activity_level
        .as_deref()
        .and_then(ActivityLevel::parse)
        .unwrap_or(ActivityLevel::Sedentary);
    let goal = p
        .weight_goal
        .as_deref()
        .and_then(WeightGoal::parse)
        .unwrap_or(WeightGoal::Maintain);
    Some(suggest(p.age?, gender, p.height_cm?, p.weight_kg?, activity, goal))
}

/// Stored goals, else suggested from the profile, else defaults.
pub async fn effective_goals(db: &PgPool, user_id: Uuid) -> anyhow::Result<(Goals, GoalsOrigin)> {
    if let Some(g) = repo::get(db, user_id).await? {
        return Ok((g, GoalsOrigin::Stored));
    }
    let profile = profiles::repo::get(db, user_id).await?;
    Ok(resolve_origin(None, profile.as_ref()))
}

pub(crate) fn resolve_origin(stored: Option<Goals>, profile: Option<&Profile>) -> (Goals, GoalsOrigin) {
    if let Some(g) = stored {
        return (g, GoalsOrigin::Stored);
    }
    match profile.and_then(suggest_for_profile) {
        Some(g) => (g, GoalsOrigin::Suggested),
        None => (Goals::DEFAULT, GoalsOrigin::Default),
    }
}
