use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream credits exhausted")]
    CreditsExhausted,

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned an empty completion")]
    EmptyResponse,

    #[error("malformed model output: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Image sent inline with a user message.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime: String,
    pub base64: String,
}

impl InlineImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub image: Option<InlineImage>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into(), image: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), image: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), image: None }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Ask the model for a JSON object reply.
    pub json: bool,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, json: false, temperature: None }
    }
}

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError>;
}

/// Runs a completion in JSON mode and deserializes the reply.
pub async fn complete_json<T: DeserializeOwned>(
    ai: &dyn AiClient,
    mut req: CompletionRequest,
) -> Result<T, AiError> {
    req.json = true;
    let raw = ai.complete(req).await?;
    parse_json_reply(&raw)
}

/// Models often wrap JSON in Markdown fences or add a sentence around it.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let cleaned = strip_code_fence(raw);
    match serde_json::from_str(cleaned) {
        Ok(v) => Ok(v),
        Err(first) => {
            let start = cleaned.find(['{', '[']);
            let end = cleaned.rfind(['}', ']']);
            match (start, end) {
                (Some(s), Some(e)) if e > s => serde_json::from_str(&cleaned[s..=e])
                    .map_err(|e| AiError::Malformed(e.to_string())),
                _ => Err(AiError::Malformed(first.to_string())),
            }
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            let rest = rest.trim_end();
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpAiClient {
    pub fn new(http: reqwest::Client, cfg: &AiConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn request_body(model: &str, req: &CompletionRequest) -> Value {
    let messages: Vec<Value> = req
        .messages
        .iter()
        .map(|m| {
            let content = match &m.image {
                Some(img) => json!([
                    { "type": "text", "text": m.text },
                    { "type": "image_url", "image_url": { "url": img.data_url() } },
                ]),
                None => Value::String(m.text.clone()),
            };
            json!({ "role": m.role, "content": content })
        })
        .collect();

    let mut body = json!({ "model": model, "messages": messages });
    if req.json {
        body["response_format"] = json!({ "type": "json_object" });
    }
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    body
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError> {
        let body = request_body(&self.model, &req);
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            429 => return Err(AiError::RateLimited),
            402 => return Err(AiError::CreditsExhausted),
            _ => {}
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "ai gateway error");
            return Err(AiError::Status { status: status.as_u16(), body });
        }

        let parsed: CompletionResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyResponse)?;
        debug!(len = content.len(), "ai completion received");
        Ok(content)
    }
}
