use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChatRequest {
    pub message: Option<String>,
    pub image: Option<String>,
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct HealthChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedResponse {
    pub deleted: u64,
}
