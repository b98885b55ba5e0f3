use axum::{extract::State, routing::post, Json, Router};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{
    dto::{
        ConditionAdvice, ConditionAdviceRequest, MealType, RecommendationsRequest,
        RecommendationsResponse,
    },
    services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    goals, profiles,
    scans::{self, dto::Remaining, services::utc_day_bounds},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/functions/condition-advice", post(condition_advice))
        .route(
            "/functions/get-food-recommendations",
            post(get_food_recommendations),
        )
}

#[instrument(skip(state, body))]
pub async fn condition_advice(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<ConditionAdviceRequest>,
) -> AppResult<Json<ConditionAdvice>> {
    let condition = services::validate_condition(body.condition.as_deref())?;
    let advice =
        services::condition_advice(state.ai.as_ref(), &condition, body.language.as_deref()).await?;
    info!(%user_id, condition = %condition, "condition advice generated");
    Ok(Json(advice))
}

#[instrument(skip(state, body))]
pub async fn get_food_recommendations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<RecommendationsRequest>,
) -> AppResult<Json<RecommendationsResponse>> {
    let meal = match body.meal_type.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(m) => Some(MealType::parse(m).ok_or_else(|| {
            AppError::bad_request("mealType must be breakfast, lunch, dinner or snack")
        })?),
        None => None,
    };

    let (from, to) = utc_day_bounds(OffsetDateTime::now_utc().date());
    let (profile, (goals, _), (consumed, _)) = tokio::try_join!(
        profiles::repo::get(&state.db, user_id),
        goals::services::effective_goals(&state.db, user_id),
        scans::repo::totals_between(&state.db, user_id, from, to),
    )?;
    let remaining = Remaining::of(&goals, &consumed);

    let recommendations =
        services::recommend_foods(state.ai.as_ref(), profile.as_ref(), &remaining, meal).await?;
    info!(%user_id, count = recommendations.len(), "food recommendations generated");
    Ok(Json(RecommendationsResponse {
        remaining,
        recommendations,
    }))
}
