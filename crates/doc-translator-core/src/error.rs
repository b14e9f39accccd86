use thiserror::Error;

/// Unified error type for doc-translator-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Request validation (formats, payload limits, unknown jobs)
/// - Document extraction (PDF, DOCX, plain text)
/// - Translation provider calls (requests, responses, rate limiting)
/// - PDF rendering
/// - Cache and configuration operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// File extension is not one of the supported document formats
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// File or text exceeds a configured limit
    #[error("{what} too large: {size} exceeds the limit of {limit}")]
    PayloadTooLarge {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    /// Malformed request rejected before any job is created
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown or expired job identifier
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job exists but has not produced the requested artifact yet
    #[error("job {0} has not completed yet")]
    JobNotReady(String),

    /// Job was cancelled by the client
    #[error("job cancelled")]
    Cancelled,

    // ==========================================================================
    // Extraction Errors
    // ==========================================================================
    /// No usable text could be recovered from the document
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// Extraction exceeded its wall-clock budget
    #[error("document processing timed out after {seconds} seconds")]
    UploadTimeout { seconds: u64 },

    /// Failed to open or parse a PDF file
    #[error("failed to open PDF: {0}")]
    PdfOpen(String),

    // ==========================================================================
    // Translation Errors
    // ==========================================================================
    /// Translation provider request failed
    #[error("translation request failed: {0}")]
    ProviderRequest(String),

    /// Invalid response from the translation provider
    #[error("invalid translation response: {0}")]
    ProviderInvalidResponse(String),

    /// Rate limited by the translation provider
    #[error("translation rate limited{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    ProviderRateLimited { retry_after: Option<u64> },

    /// Translation request timed out
    #[error("translation request timed out")]
    ProviderTimeout,

    /// API key not configured for the translation provider
    #[error("translation API key not configured")]
    ProviderMissingApiKey,

    // ==========================================================================
    // Rendering Errors
    // ==========================================================================
    /// PDF generation failed (engine launch, timeout, or layout)
    #[error("PDF generation failed: {0}")]
    RenderFailed(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    // ==========================================================================
    // Cache Errors
    // ==========================================================================
    /// Failed to initialize the cache
    #[error("failed to initialize cache: {0}")]
    CacheInit(String),

    /// Failed to write to cache
    #[error("failed to write to cache: {0}")]
    CacheWrite(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case tag for this error, reported to HTTP clients.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidRequest(_) => "invalid_request",
            Self::JobNotFound(_) => "job_not_found",
            Self::JobNotReady(_) => "job_not_ready",
            Self::Cancelled => "cancelled",
            Self::ExtractionFailed(_) | Self::PdfOpen(_) => "extraction_failed",
            Self::UploadTimeout { .. } => "upload_timeout",
            Self::ProviderRequest(_)
            | Self::ProviderInvalidResponse(_)
            | Self::ProviderTimeout
            | Self::ProviderMissingApiKey => "provider_error",
            Self::ProviderRateLimited { .. } => "provider_rate_limited",
            Self::RenderFailed(_) | Self::Lopdf(_) => "render_failed",
            Self::CacheInit(_) | Self::CacheWrite(_) => "cache_error",
            Self::ConfigLoad(_) | Self::ConfigInvalid { .. } => "config_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether the failed operation may succeed if retried after a delay.
    ///
    /// Only provider rate limiting is retried; every other provider failure
    /// degrades to the untranslated text immediately.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderRateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
