use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument};

use super::{
    dto::{Goals, GoalsOrigin, GoalsResponse},
    repo, services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    profiles,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/goals", get(get_goals).put(put_goals))
        .route("/goals/suggested", get(get_suggested_goals))
}

#[instrument(skip(state))]
pub async fn get_goals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<GoalsResponse>> {
    let (goals, origin) = services::effective_goals(&state.db, user_id).await?;
    Ok(Json(GoalsResponse { goals, origin }))
}

#[instrument(skip(state, body))]
pub async fn put_goals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<Goals>,
) -> AppResult<Json<GoalsResponse>> {
    let goals = repo::upsert(&state.db, user_id, &body.validate()?).await?;
    info!(%user_id, calories = goals.daily_calories, "goals updated");
    Ok(Json(GoalsResponse {
        goals,
        origin: GoalsOrigin::Stored,
    }))
}

#[instrument(skip(state))]
pub async fn get_suggested_goals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<GoalsResponse>> {
    let profile = profiles::repo::get(&state.db, user_id).await?;
    let goals = profile
        .as_ref()
        .and_then(services::suggest_for_profile)
        .ok_or_else(|| {
            AppError::Unprocessable(
                "Complete your profile (age, gender, height, weight) to get suggested goals".into(),
            )
        })?;
    Ok(Json(GoalsResponse {
        goals,
        origin: GoalsOrigin::Suggested,
    }))
}
