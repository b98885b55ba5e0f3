use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::cache::TranslationCache;
use crate::clients::ai::{complete_json, AiClient, AiError, CompletionRequest, Message};
use crate::error::{AppError, AppResult};

pub const MAX_TEXTS: usize = 100;
pub const MAX_TEXT_CHARS: usize = 5000;

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("hi", "Hindi"),
    ("bn", "Bengali"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("mr", "Marathi"),
    ("gu", "Gujarati"),
    ("kn", "Kannada"),
    ("ml", "Malayalam"),
    ("pa", "Punjabi"),
    ("or", "Odia"),
    ("ur", "Urdu"),
    ("as", "Assamese"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("ar", "Arabic"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
];

/// Display name for a language code, or the code itself when unknown.
pub fn language_name(code: &str) -> &str {
    let base = code.split('-').next().unwrap_or(code);
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(base))
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Lowercased BCP 47-ish code such as `hi` or `pt-br`.
pub fn normalize_language(code: Option<&str>) -> AppResult<String> {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[a-z]{2,3}(-[a-z0-9]{2,8})?$").unwrap();
    }
    let code = code
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("targetLanguage is required"))?;
    if !CODE_RE.is_match(&code) {
        return Err(AppError::bad_request("targetLanguage must be a language code like 'hi'"));
    }
    Ok(code)
}

pub fn is_english(code: &str) -> bool {
    code == "en" || code.starts_with("en-")
}

pub fn validate_texts(texts: &[String]) -> AppResult<()> {
    if texts.len() > MAX_TEXTS {
        return Err(AppError::bad_request(format!(
            "At most {MAX_TEXTS} texts can be translated at once"
        )));
    }
    if texts.iter().any(|t| t.chars().count() > MAX_TEXT_CHARS) {
        return Err(AppError::bad_request(format!(
            "Each text must be at most {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchReply {
    Wrapped { translations: Vec<String> },
    Bare(Vec<String>),
}

impl BatchReply {
    fn into_vec(self) -> Vec<String> {
        match self {
            BatchReply::Wrapped { translations } => translations,
            BatchReply::Bare(v) => v,
        }
    }
}

/// Translates `texts` in order. Cached and blank entries never reach the
/// model; the remaining distinct texts go out in one request.
#[instrument(skip(ai, cache, texts), fields(count = texts.len()))]
pub async fn translate_batch(
    ai: &dyn AiClient,
    cache: &TranslationCache,
    language: &str,
    texts: Vec<String>,
) -> AppResult<Vec<String>> {
    if is_english(language) {
        return Ok(texts);
    }

    let mut out: Vec<Option<String>> = Vec::with_capacity(texts.len());
    let mut misses: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for t in &texts {
        if t.trim().is_empty() {
            out.push(Some(t.clone()));
        } else if let Some(hit) = cache.get(language, t) {
            out.push(Some(hit));
        } else {
            if seen.insert(t.as_str()) {
                misses.push(t.clone());
            }
            out.push(None);
        }
    }
    debug!(misses = misses.len(), "translation cache lookup");

    if !misses.is_empty() {
        let system = format!(
            "Translate each string in the JSON array the user sends into {}. Keep numbers, \
             units and food names recognizable. Reply with JSON only: {{\"translations\": \
             [string]}} containing exactly {} items in the same order.",
            language_name(language),
            misses.len()
        );
        let payload = serde_json::to_string(&misses).map_err(anyhow::Error::from)?;
        let req = CompletionRequest {
            messages: vec![Message::system(system), Message::user(payload)],
            temperature: Some(0.2),
            ..Default::default()
        };
        let translated = complete_json::<BatchReply>(ai, req).await?.into_vec();
        if translated.len() != misses.len() {
            return Err(AiError::Malformed(format!(
                "expected {} translations, got {}",
                misses.len(),
                translated.len()
            ))
            .into());
        }
        for (src, dst) in misses.iter().zip(&translated) {
            cache.insert(language, src, dst);
        }
    }

    Ok(texts
        .iter()
        .zip(out)
        .map(|(src, done)| {
            done.or_else(|| cache.get(language, src))
                .unwrap_or_else(|| src.clone())
        })
        .collect())
}
