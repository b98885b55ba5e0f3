use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{CreateStoryRequest, StoryResponse},
    repo,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    images::services::presign_opt,
    scans,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stories", get(feed).post(create_story))
        .route("/stories/:id", delete(delete_story))
}

#[instrument(skip(state, body))]
pub async fn create_story(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<CreateStoryRequest>,
) -> AppResult<(StatusCode, Json<StoryResponse>)> {
    let caption = body.caption()?;
    let scan = scans::repo::get(&state.db, user_id, body.scan_id)
        .await?
        .ok_or_else(|| AppError::not_found("Scan not found"))?;

    let story = repo::insert(
        &state.db,
        user_id,
        scan.id,
        caption.as_deref(),
        OffsetDateTime::now_utc(),
    )
    .await?;
    info!(%user_id, story_id = %story.id, scan_id = %scan.id, "story posted");

    let image_url = presign_opt(&state, scan.image_key.as_deref()).await;
    Ok((
        StatusCode::CREATED,
        Json(StoryResponse {
            id: story.id,
            user_id,
            author_name: None,
            scan_id: scan.id,
            caption: story.caption,
            food_name: scan.food_name,
            calories: scan.calories,
            image_url,
            created_at: story.created_at,
            expires_at: story.expires_at,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn feed(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> AppResult<Json<Vec<StoryResponse>>> {
    let rows = repo::live_feed(&state.db, OffsetDateTime::now_utc()).await?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let image_url = presign_opt(&state, r.image_key.as_deref()).await;
        out.push(StoryResponse {
            id: r.id,
            user_id: r.user_id,
            author_name: r.author_name,
            scan_id: r.scan_id,
            caption: r.caption,
            food_name: r.food_name,
            calories: r.calories,
            image_url,
            created_at: r.created_at,
            expires_at: r.expires_at,
        });
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn delete_story(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !repo::delete(&state.db, user_id, id).await? {
        return Err(AppError::not_found("Story not found"));
    }
    info!(%user_id, story_id = %id, "story deleted");
    Ok(StatusCode::NO_CONTENT)
}
