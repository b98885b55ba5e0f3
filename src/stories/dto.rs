use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_CAPTION_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryRequest {
    #[serde(alias = "scan_id")]
    pub scan_id: Uuid,
    pub caption: Option<String>,
}

impl CreateStoryRequest {
    /// Trimmed caption; blank captions become `None`.
    pub fn caption(&self) -> AppResult<Option<String>> {
        let caption = self
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        match caption {
            Some(c) if c.chars().count() > MAX_CAPTION_CHARS => Err(AppError::bad_request(format!(
                "caption must be at most {MAX_CAPTION_CHARS} characters"
            ))),
            other => Ok(other.map(str::to_string)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author_name: Option<String>,
    pub scan_id: Uuid,
    pub caption: Option<String>,
    pub food_name: String,
    pub calories: f64,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}
