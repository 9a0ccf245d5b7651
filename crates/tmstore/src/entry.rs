//! Cached translation pairs and their lookup keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached source -> translation pair plus access metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Original untranslated text, as supplied by the last `store`
    pub source_text: String,

    /// Normalized target language code (e.g. "ja")
    pub target_language: String,

    /// Translated text
    pub translation: String,

    /// When the entry was first stored
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,

    /// When the entry was last stored or hit
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_access_at: DateTime<Utc>,

    /// Number of stores and hits, never decreases
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a fresh entry stamped with `now`
    pub fn new(
        source_text: impl Into<String>,
        target_language: &str,
        translation: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            target_language: normalize_language(target_language),
            translation: translation.into(),
            created_at: now,
            last_access_at: now,
            access_count: 1,
        }
    }

    /// Record a hit at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access_at = now;
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Key this entry is stored under
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.target_language, &self.source_text)
    }
}

/// Composite key: target language plus normalized source text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    language: String,
    text: String,
}

impl CacheKey {
    /// Build a key, normalizing both parts
    pub fn new(target_language: &str, source_text: &str) -> Self {
        Self {
            language: normalize_language(target_language),
            text: normalize_text(source_text),
        }
    }

    /// Normalized target language
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Normalized source text
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Trim, lowercase and collapse every whitespace run into a single space
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Trim and lowercase a language code
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello   World\t\n"), "hello world");
        assert_eq!(normalize_text("\u{3000}こんにちは  世界"), "こんにちは 世界");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_key_ignores_formatting() {
        let a = CacheKey::new("JA", "Hello  world");
        let b = CacheKey::new(" ja ", "hello world ");
        assert_eq!(a, b);
        assert_eq!(a.language(), "ja");
        assert_eq!(a.text(), "hello world");
    }

    #[test]
    fn test_key_separates_languages() {
        assert_ne!(CacheKey::new("ja", "hello"), CacheKey::new("fr", "hello"));
    }

    #[test]
    fn test_entry_touch() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let mut entry = CacheEntry::new("Hello", "JA", "こんにちは", created);
        assert_eq!(entry.target_language, "ja");
        assert_eq!(entry.access_count, 1);

        entry.touch(later);
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.created_at, created);
        assert_eq!(entry.last_access_at, later);
    }

    #[test]
    fn test_entry_serializes_epoch_seconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let entry = CacheEntry::new("Hello", "ja", "こんにちは", at);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["sourceText"], "Hello");
        assert_eq!(json["targetLanguage"], "ja");
        assert_eq!(json["createdAt"], 1_700_000_000);
        assert_eq!(json["lastAccessAt"], 1_700_000_000);
        assert_eq!(json["accessCount"], 1);
    }
}
