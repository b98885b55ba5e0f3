use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Process-wide translations keyed by `(language, source text)`.
/// Entries live as long as the process; there is no eviction.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl TranslationCache {
    pub fn get(&self, language: &str, text: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(language.to_string(), text.to_string()))
            .cloned()
    }

    pub fn insert(&self, language: &str, text: &str, translated: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            (language.to_string(), text.to_string()),
            translated.to_string(),
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
