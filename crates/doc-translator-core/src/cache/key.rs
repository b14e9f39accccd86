use crate::config::Lang;

/// Cache key for a translated chunk.
///
/// The source text is normalized (trimmed, lowercased) and hashed with MD5,
/// then combined with the target language:
/// - Same text (modulo case and surrounding whitespace) + language = same key
/// - Any other change to the text or language produces a different key
/// - The hash part is fixed-length (32 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    pub fn new(text: &str, target_lang: &Lang) -> Self {
        let normalized = text.trim().to_lowercase();
        let digest = md5::compute(normalized.as_bytes());

        Self {
            key: format!("{digest:x}_{}", target_lang.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}
