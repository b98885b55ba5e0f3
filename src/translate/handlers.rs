use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::services;
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: Option<String>,
    pub texts: Option<Vec<String>>,
    #[serde(alias = "target_language", alias = "language")]
    pub target_language: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_texts: Option<Vec<String>>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/functions/translate-text", post(translate_text))
}

#[instrument(skip(state, body))]
pub async fn translate_text(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<TranslateRequest>,
) -> AppResult<Json<TranslateResponse>> {
    let language = services::normalize_language(body.target_language.as_deref())?;
    let (texts, single) = match (body.text, body.texts) {
        (Some(t), None) => (vec![t], true),
        (None, Some(ts)) => (ts, false),
        _ => return Err(AppError::bad_request("Provide exactly one of text or texts")),
    };
    services::validate_texts(&texts)?;

    let count = texts.len();
    let mut translated =
        services::translate_batch(state.ai.as_ref(), &state.translations, &language, texts).await?;
    info!(%user_id, %language, count, cached = state.translations.len(), "texts translated");

    Ok(Json(if single {
        TranslateResponse {
            translated_text: translated.pop(),
            ..Default::default()
        }
    } else {
        TranslateResponse {
            translated_texts: Some(translated),
            ..Default::default()
        }
    }))
}
