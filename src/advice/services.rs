use tracing::instrument;

use super::dto::{ConditionAdvice, FoodRecommendation, MealType, RecommendationReply};
use crate::clients::ai::{complete_json, AiClient, CompletionRequest, Message};
use crate::error::{AppError, AppResult};
use crate::profiles::Profile;
use crate::scans::dto::Remaining;
use crate::translate::services::language_name;

pub const MAX_CONDITION_CHARS: usize = 200;
const MAX_RECOMMENDATIONS: usize = 8;

const CONDITION_PROMPT: &str = "You are a clinical nutritionist. For the given health \
condition reply with JSON only: {\"condition\": string, \"foodsToEat\": [string], \
\"foodsToAvoid\": [string], \"tips\": [string]}. Give 5 to 10 foods in each list and \
3 to 6 short practical tips. Prefer foods common in Indian households.";

const RECOMMEND_PROMPT: &str = "You are a nutrition coach. Suggest foods that fit the \
user's remaining nutrition budget for today. Reply with JSON only: {\"recommendations\": \
[{\"name\": string, \"calories\": number, \"protein\": number, \"reason\": string}]}. \
Give 3 to 6 options; calories and protein are for one typical serving.";

pub fn validate_condition(condition: Option<&str>) -> AppResult<String> {
    let c = condition
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("condition is required"))?;
    if c.chars().count() > MAX_CONDITION_CHARS {
        return Err(AppError::bad_request(format!(
            "condition is too long, maximum is {MAX_CONDITION_CHARS} characters"
        )));
    }
    Ok(c.to_string())
}

#[instrument(skip(ai))]
pub async fn condition_advice(
    ai: &dyn AiClient,
    condition: &str,
    language: Option<&str>,
) -> AppResult<ConditionAdvice> {
    let mut system = CONDITION_PROMPT.to_string();
    if let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty() && *l != "en") {
        system.push_str(&format!(
            " Write every value in {}; keep the JSON keys in English.",
            language_name(lang)
        ));
    }
    let req = CompletionRequest {
        messages: vec![
            Message::system(system),
            Message::user(format!("Condition: {condition}")),
        ],
        temperature: Some(0.4),
        ..Default::default()
    };
    let mut advice: ConditionAdvice = complete_json(ai, req).await?;
    if advice.condition.trim().is_empty() {
        advice.condition = condition.to_string();
    }
    if advice.foods_to_eat.is_empty() && advice.foods_to_avoid.is_empty() && advice.tips.is_empty() {
        return Err(AppError::Unprocessable(format!("No advice available for {condition}")));
    }
    Ok(advice)
}

pub fn describe_budget(
    profile: Option<&Profile>,
    remaining: &Remaining,
    meal: Option<MealType>,
) -> String {
    let mut out = format!(
        "Remaining today: {} kcal, {} g protein, {} g carbs, {} g fat, {} g fiber.\n",
        remaining.calories, remaining.protein, remaining.carbs, remaining.fat, remaining.fiber
    );
    if let Some(meal) = meal {
        out.push_str(&format!("Meal: {}.\n", meal.as_str()));
    }
    if let Some(p) = profile {
        if let Some(diet) = &p.dietary_preference {
            out.push_str(&format!("Diet: {diet}.\n"));
        }
        if !p.health_conditions.is_empty() {
            out.push_str(&format!("Health conditions: {}.\n", p.health_conditions.join(", ")));
        }
        if let Some(goal) = &p.weight_goal {
            out.push_str(&format!("Weight goal: {goal}.\n"));
        }
    }
    if remaining.calories <= 0.0 {
        out.push_str("The calorie goal is already met; suggest only very light options.\n");
    }
    out
}

#[instrument(skip_all)]
pub async fn recommend_foods(
    ai: &dyn AiClient,
    profile: Option<&Profile>,
    remaining: &Remaining,
    meal: Option<MealType>,
) -> AppResult<Vec<FoodRecommendation>> {
    let req = CompletionRequest {
        messages: vec![
            Message::system(RECOMMEND_PROMPT),
            Message::user(describe_budget(profile, remaining, meal)),
        ],
        temperature: Some(0.6),
        ..Default::default()
    };
    let reply: RecommendationReply = complete_json(ai, req).await?;
    Ok(reply
        .recommendations
        .into_iter()
        .filter(|r| !r.name.trim().is_empty())
        .take(MAX_RECOMMENDATIONS)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAi;

    fn remaining(calories: f64) -> Remaining {
        Remaining { calories, protein: 20.0, fat: 10.0, carbs: 60.0, fiber: 8.0 }
    }

    #[test]
    fn condition_is_required_and_bounded() {
        assert!(matches!(validate_condition(None), Err(AppError::BadRequest(_))));
        assert!(validate_condition(Some("  ")).is_err());
        assert!(validate_condition(Some(&"x".repeat(MAX_CONDITION_CHARS + 1))).is_err());
        assert_eq!(validate_condition(Some(" PCOS ")).unwrap(), "PCOS");
    }

    #[tokio::test]
    async fn advice_requests_language_and_fills_condition() {
        let ai = ScriptedAi::replying(&[
            r#"{"foods_to_eat": ["oats"], "foodsToAvoid": ["sugar"], "tips": ["walk daily"]}"#,
        ]);
        let a = condition_advice(&ai, "diabetes", Some("hi")).await.unwrap();
        assert_eq!(a.condition, "diabetes");
        assert_eq!(a.foods_to_eat, vec!["oats".to_string()]);
        assert_eq!(a.foods_to_avoid, vec!["sugar".to_string()]);
        assert!(ai.requests()[0].messages[0].text.contains("Hindi"));
    }

    #[tokio::test]
    async fn empty_advice_is_unprocessable() {
        let ai = ScriptedAi::replying(&[r#"{"condition": "x"}"#]);
        let err = condition_advice(&ai, "x", None).await.unwrap_err();
        assert!(matches!(err, AppError::Unprocessable(_)));
    }

    #[test]
    fn budget_mentions_meal_and_exhausted_calories() {
        let text = describe_budget(None, &remaining(0.0), Some(MealType::Dinner));
        assert!(text.contains("Meal: dinner."));
        assert!(text.contains("already met"));
        assert!(!describe_budget(None, &remaining(500.0), None).contains("already met"));
    }

    #[tokio::test]
    async fn recommendations_drop_nameless_entries() {
        let ai = ScriptedAi::replying(&[
            r#"{"recommendations": [{"name": "Paneer tikka", "calories": 250, "protein": 18, "reason": "protein"}, {"name": ""}]}"#,
        ]);
        let recs = recommend_foods(&ai, None, &remaining(600.0), None).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "Paneer tikka");
        assert_eq!(recs[0].protein, 18.0);
    }
}
