use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Language codes following ISO 639-1 with regional variants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the source language should be detected by the provider.
    pub fn is_auto(&self) -> bool {
        self.0 == "auto"
    }
}

fn default_source_lang() -> Lang {
    Lang::new(DEFAULT_SOURCE_LANG)
}

fn default_target_lang() -> Lang {
    Lang::new(DEFAULT_TARGET_LANG)
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Default source language code (provider-side detection)
pub const DEFAULT_SOURCE_LANG: &str = "auto";
/// Default target language code
pub const DEFAULT_TARGET_LANG: &str = "en";

/// Which machine-translation backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Public Google Translate endpoint (no key required)
    #[default]
    Google,
    /// Any OpenAI-compatible chat completions API (llama.cpp, Ollama, OpenAI...)
    OpenAi,
}

/// Translator backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// HTTP timeout for a single provider call
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_model() -> String {
    "default_model".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of translated chunks kept in memory (FIFO bound)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Persist translations to disk as well
    #[serde(default)]
    pub disk_enabled: bool,

    /// Disk cache directory (defaults to ~/.cache/doc-translator)
    pub disk_path: Option<PathBuf>,
}

const fn default_max_entries() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            disk_enabled: false,
            disk_path: None,
        }
    }
}

/// Provider request quota per window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

const fn default_requests_per_window() -> u32 {
    60
}

const fn default_window_secs() -> u64 {
    60
}

impl RateLimitConfig {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

/// Backoff applied when the provider rate-limits a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    2000
}

const fn default_growth_factor() -> f64 {
    1.5
}

/// Upper bounds accepted by [`AppConfig::validate`].
const MAX_RETRIES: u32 = 10;
const MAX_BASE_DELAY_MS: u64 = 60_000;

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            growth_factor: default_growth_factor(),
        }
    }
}

/// Chunking and batch dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks dispatched concurrently per rate-limiter acquisition
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive batches
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

const fn default_chunk_size() -> usize {
    1500
}

const fn default_batch_size() -> usize {
    10
}

const fn default_batch_pause_ms() -> u64 {
    500
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

/// Request boundary limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,
    /// Seconds allowed for receiving an upload body
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// PDFs yielding less text than this are treated as scanned images
    #[serde(default = "default_min_pdf_text_chars")]
    pub min_pdf_text_chars: usize,
}

const fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

const fn default_max_text_chars() -> usize {
    200_000
}

const fn default_extraction_timeout_secs() -> u64 {
    45
}

const fn default_upload_timeout_secs() -> u64 {
    60
}

const fn default_min_pdf_text_chars() -> usize {
    50
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_text_chars: default_max_text_chars(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            min_pdf_text_chars: default_min_pdf_text_chars(),
        }
    }
}

/// PDF rendering engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderEngine {
    /// Headless Chromium, degrading to the built-in renderer on failure
    #[default]
    Auto,
    Chromium,
    Builtin,
}

impl RenderEngine {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Chromium => "chromium",
            Self::Builtin => "builtin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub engine: RenderEngine,
    /// Chromium executable (defaults to `chromium` on PATH)
    pub chromium_path: Option<PathBuf>,
    #[serde(default = "default_render_timeout_secs")]
    pub timeout_secs: u64,
    /// TrueType font for the built-in renderer (defaults to a system font)
    pub font_path: Option<PathBuf>,
}

const fn default_render_timeout_secs() -> u64 {
    30
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: RenderEngine::default(),
            chromium_path: None,
            timeout_secs: default_render_timeout_secs(),
            font_path: None,
        }
    }
}

/// Job store retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Seconds a job record survives after its last write
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: u64,
}

const fn default_retention_secs() -> u64 {
    3600
}

const fn default_max_jobs() -> u64 {
    10_000
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_jobs: default_max_jobs(),
        }
    }
}

/// How translated text is aligned with the source structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Translate each source line separately so line counts always agree
    #[default]
    LineAligned,
    /// Translate the text as a whole and match lines by position
    Positional,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub reconcile: ReconcileMode,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source language
    #[serde(default = "default_source_lang")]
    pub source_lang: Lang,

    /// Default target language
    #[serde(default = "default_target_lang")]
    pub target_lang: Lang,

    #[serde(default)]
    pub translator: TranslatorConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            translator: TranslatorConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            limits: LimitsConfig::default(),
            render: RenderConfig::default(),
            jobs: JobsConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Environment variable prefix for layered configuration,
/// e.g. `DOC_TRANSLATOR__BATCH__CHUNK_SIZE=800`.
pub const ENV_PREFIX: &str = "DOC_TRANSLATOR";

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations, lowest priority first:
    /// ~/.config/doc-translator/config.toml, ./config.toml, then
    /// `DOC_TRANSLATOR__*` environment variables.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("doc-translator").join("config.toml");
            if user_config.exists() {
                tracing::debug!("Loading config from {}", user_config.display());
                builder = builder.add_source(config::File::from(user_config).required(false));
            }
        }

        builder = builder
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the pipeline.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(Error::ConfigInvalid {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.batch.chunk_size == 0 {
            return invalid("batch.chunk_size", "must be greater than zero");
        }
        if self.batch.batch_size == 0 {
            return invalid("batch.batch_size", "must be greater than zero");
        }
        if self.rate_limit.requests_per_window == 0 {
            return invalid("rate_limit.requests_per_window", "must be greater than zero");
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries", "must be greater than zero");
        }
        if !self.retry.growth_factor.is_finite() || self.retry.growth_factor < 1.0 {
            return invalid("retry.growth_factor", "must be a finite number >= 1.0");
        }
        if self.retry.max_retries > MAX_RETRIES {
            return invalid("retry.max_retries", "must be at most 10");
        }
        if self.retry.base_delay_ms > MAX_BASE_DELAY_MS {
            return invalid("retry.base_delay_ms", "must be at most 60000");
        }
        if self.limits.upload_timeout_secs == 0 {
            return invalid("limits.upload_timeout_secs", "must be greater than zero");
        }
        Ok(())
    }
}
