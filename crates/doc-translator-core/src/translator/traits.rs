use async_trait::async_trait;
use crate::config::Lang;
use crate::error::Result;

/// Information about a translation provider
#[derive(Debug, Clone)]
pub struct TranslatorInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether calls fail without an API key
    pub requires_api_key: bool,
    /// Whether the provider can detect the source language itself
    pub supports_auto_detect: bool,
}

/// A machine-translation provider.
///
/// Implementations make exactly one provider call per `translate` and report
/// throttling as [`Error::ProviderRateLimited`](crate::Error::ProviderRateLimited);
/// retrying and rate limiting are the batch translator's job.
#[async_trait]
pub trait Translator: Send + Sync {
    fn info(&self) -> TranslatorInfo;

    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Translate `text` from `source` (possibly `auto`) into `target`.
    async fn translate(&self, text: &str, source: &Lang, target: &Lang) -> Result<String>;
}
