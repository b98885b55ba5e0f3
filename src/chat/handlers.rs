use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{ClearedResponse, HealthChatRequest, HealthChatResponse, HistoryQuery},
    repo::{self, ChatMessage},
    services,
};
use crate::{
    auth::AuthUser,
    error::AppResult,
    extract::ApiJson,
    images::services::decode_image,
    state::AppState,
};

pub fn function_routes() -> Router<AppState> {
    Router::new().route("/functions/health-chat", post(health_chat))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/history", get(get_history).delete(clear_history))
}

#[instrument(skip(state, body))]
pub async fn health_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<HealthChatRequest>,
) -> AppResult<Json<HealthChatResponse>> {
    let message = services::validate_request(&body, user_id)?;
    let image = body
        .image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| decode_image(raw, state.config.limits.max_image_bytes))
        .transpose()?;

    let ctx = services::load_context(&state.db, user_id).await?;
    let messages = services::build_messages(
        &ctx,
        message.as_deref(),
        image.as_ref().map(|i| i.inline()),
    );
    let reply = services::reply(state.ai.as_ref(), messages).await?;

    let stored_question = message.as_deref().unwrap_or("[image]");
    repo::insert_exchange(&state.db, user_id, stored_question, image.is_some(), &reply).await?;
    info!(
        %user_id,
        history = ctx.history.len(),
        has_image = image.is_some(),
        "health chat answered"
    );

    Ok(Json(HealthChatResponse { reply }))
}

#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(repo::recent(&state.db, user_id, q.limit()).await?))
}

#[instrument(skip(state))]
pub async fn clear_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ClearedResponse>> {
    let deleted = repo::clear(&state.db, user_id).await?;
    info!(%user_id, deleted, "chat history cleared");
    Ok(Json(ClearedResponse { deleted }))
}
