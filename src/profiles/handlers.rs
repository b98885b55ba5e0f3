use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument};

use super::{dto::UpdateProfileRequest, repo, repo::Profile};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(put_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Profile>> {
    repo::get(&state.db, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Profile not found"))
}

#[instrument(skip(state, body))]
pub async fn put_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let input = body.validate()?;
    let profile = repo::upsert(&state.db, user_id, &input).await?;
    info!(%user_id, "profile updated");
    Ok(Json(profile))
}
