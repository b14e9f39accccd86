//! Document Translator Core Library
//!
//! This library provides the core functionality for translating documents:
//! - Text extraction from PDF, DOCX and plain text
//! - Sentence-aligned chunking and rate-limited batch translation
//! - Translation via Google Translate or OpenAI-compatible APIs
//! - Caching (memory and disk)
//! - Structure-preserving HTML reconciliation and PDF rendering
//! - Background jobs with pollable progress

pub mod batch;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod pipeline;
pub mod rate_limit;
pub mod reconcile;
pub mod render;
pub mod retry;
pub mod translator;
pub mod util;

pub use batch::{BatchReport, BatchTranslator};
pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use chunker::chunk_text;
pub use config::{
    AppConfig, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG, Lang, Provider, ReconcileMode,
    RenderEngine, TranslatorConfig,
};
pub use error::{Error, Result};
pub use extract::{DocumentFormat, ExtractedContent, StructuralElement};
pub use jobs::{JobKind, JobRecord, JobState, JobStore};
pub use pipeline::{Pipeline, ServiceStatus, TranslationRequest, UploadOutcome};
pub use rate_limit::RateLimiter;
pub use render::{PdfRenderer, create_renderer};
pub use retry::RetryPolicy;
pub use translator::{Translator, create_translator};
pub use util::clear_translation_cache;
