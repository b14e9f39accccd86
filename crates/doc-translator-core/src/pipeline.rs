//! Upload, translate and render documents as background jobs.
//!
//! A [`Pipeline`] owns the components shared by every job (cache, rate
//! limiter, batch translator, renderer) and the [`JobStore`] that pollers read.
//! Each job runs in its own tokio task and is the only writer of its record.
//!
//! Translation job states and the progress published on entry:
//!
//! | State              | Progress |
//! |--------------------|----------|
//! | `initializing`     | 5        |
//! | `translating`      | 10 to 85 |
//! | `reconciling_html` | 88       |
//! | `generating_pdf`   | 93       |
//! | `completed`        | 100      |

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::BatchTranslator;
use crate::cache::{CacheStats, TranslationCache};
use crate::chunker::chunk_text;
use crate::config::{AppConfig, Lang, LimitsConfig, ReconcileMode};
use crate::error::{Error, Result};
use crate::extract::{
    DocumentFormat, ExtractedContent, StructuralElement, extract_with_timeout, is_page_marker,
    structure_html, structure_text,
};
use crate::jobs::{JobHandle, JobKind, JobRecord, JobState, JobStore, TranslationOutput};
use crate::rate_limit::{RateLimitSnapshot, RateLimiter};
use crate::reconcile::reconcile_html;
use crate::render::{PdfRenderer, create_renderer};
use crate::translator::{Translator, create_translator};
use crate::util::non_blank_lines;

const PROGRESS_INITIALIZING: u8 = 5;
const PROGRESS_TRANSLATING: u8 = 10;
const PROGRESS_TRANSLATED: u8 = 85;
const PROGRESS_RECONCILING: u8 = 88;
const PROGRESS_GENERATING_PDF: u8 = 93;

const PROGRESS_ANALYZING: u8 = 5;
const PROGRESS_EXTRACTING: u8 = 20;

/// File name used when a translation request does not carry one.
pub const DEFAULT_FILE_NAME: &str = "document";

/// Body of a start-translation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    #[serde(default)]
    pub text: String,
    /// Structural HTML from extraction; rebuilt from `structure` or `text` when absent
    pub html: Option<String>,
    pub structure: Option<Vec<StructuralElement>>,
    #[serde(default)]
    pub target_language: String,
    /// Defaults to the configured source language
    pub source_language: Option<String>,
    pub file_name: Option<String>,
}

/// Result of an upload.
///
/// Non-PDF documents are extracted before returning; PDFs get an extraction
/// job to poll instead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_id: Option<String>,
    pub requires_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<ExtractedContent>,
    pub file_name: String,
    pub format: DocumentFormat,
}

/// A downloadable PDF.
#[derive(Debug, Clone)]
pub struct PdfArtifact {
    pub bytes: Bytes,
    pub file_name: String,
}

/// Service state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub active_jobs: usize,
    pub stored_jobs: u64,
    pub provider: &'static str,
    pub renderer: &'static str,
    pub reconcile: ReconcileMode,
    pub limits: LimitsConfig,
    pub chunk_size: usize,
    pub batch_size: usize,
    /// Absent while a job is waiting on the limiter
    pub rate_limit: Option<RateLimitSnapshot>,
    pub cache: CacheStats,
}

/// Source text split into translatable chunks, with the recipe to put the
/// translated chunks back together.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkPlan {
    chunks: Vec<String>,
    lines: Vec<PlannedLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlannedLine {
    /// Copied to the output untranslated
    Verbatim(String),
    /// Chunks whose translations are joined with a space
    Chunks(Range<usize>),
}

impl ChunkPlan {
    /// One entry per non-blank source line so the translation has the same
    /// line count. Page markers are not sent to the provider.
    fn line_aligned(text: &str, max_chars: usize) -> Self {
        let mut chunks = Vec::new();
        let mut lines = Vec::new();
        for line in non_blank_lines(text) {
            if is_page_marker(line) {
                lines.push(PlannedLine::Verbatim(line.to_string()));
                continue;
            }
            let start = chunks.len();
            chunks.extend(chunk_text(line, max_chars));
            lines.push(PlannedLine::Chunks(start..chunks.len()));
        }
        Self { chunks, lines }
    }

    /// The whole text chunked at once; the translation is a single line.
    fn positional(text: &str, max_chars: usize) -> Self {
        let chunks = chunk_text(text, max_chars);
        let lines = vec![PlannedLine::Chunks(0..chunks.len())];
        Self { chunks, lines }
    }

    fn assemble(&self, translations: &[String]) -> String {
        self.lines
            .iter()
            .map(|line| match line {
                PlannedLine::Verbatim(text) => text.clone(),
                PlannedLine::Chunks(range) => translations[range.clone()].join(" "),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Map batch progress onto the translating band (10 to 85).
fn translation_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_TRANSLATED;
    }
    let span = usize::from(PROGRESS_TRANSLATED - PROGRESS_TRANSLATING);
    let offset = span * done.min(total) / total;
    PROGRESS_TRANSLATING + u8::try_from(offset).unwrap_or(0)
}

/// Validated input of one translation job.
struct TranslationJob {
    text: String,
    html: String,
    source: Lang,
    target: Lang,
    file_name: String,
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<AppConfig>,
    jobs: JobStore,
    cache: Arc<TranslationCache>,
    limiter: Arc<RateLimiter>,
    batch: Arc<BatchTranslator>,
    renderer: Arc<dyn PdfRenderer>,
}

impl Pipeline {
    /// Build every component from configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        let translator = create_translator(&config.translator)?;
        let cache = Arc::new(TranslationCache::new(&config.cache)?);
        let renderer = create_renderer(&config.render);
        Ok(Self::with_components(config, translator, cache, renderer))
    }

    /// Build around an existing translator, cache and renderer.
    pub fn with_components(
        config: AppConfig,
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let batch = Arc::new(BatchTranslator::from_config(
            translator,
            Arc::clone(&cache),
            Arc::clone(&limiter),
            &config,
        ));
        Self {
            jobs: JobStore::from_config(&config.jobs),
            config: Arc::new(config),
            cache,
            limiter,
            batch,
            renderer,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Accept an uploaded document.
    ///
    /// TXT and DOCX are extracted inline. PDFs start an extraction job whose
    /// id is returned in `extraction_id`.
    pub async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<UploadOutcome> {
        let format = DocumentFormat::from_file_name(file_name)?;
        let limit = self.config.limits.max_upload_bytes;
        if bytes.len() > limit {
            return Err(Error::PayloadTooLarge {
                what: "file",
                size: bytes.len(),
                limit,
            });
        }

        let document_id = Uuid::new_v4().to_string();
        info!(
            "Processing upload {} ({}, {} bytes) as {}",
            file_name,
            format,
            bytes.len(),
            document_id
        );

        let mut outcome = UploadOutcome {
            document_id,
            extraction_id: None,
            requires_progress: format.requires_progress(),
            extracted_content: None,
            file_name: file_name.to_string(),
            format,
        };

        if format.requires_progress() {
            let extraction_id = Uuid::new_v4().to_string();
            let job = JobHandle::create(self.jobs.clone(), &extraction_id, JobKind::Extraction).await;
            let limits = self.config.limits.clone();
            let file_name = file_name.to_string();
            tokio::spawn(run_extraction(job, bytes, file_name, limits));
            outcome.extraction_id = Some(extraction_id);
        } else {
            let content =
                extract_with_timeout(bytes, file_name.to_string(), &self.config.limits).await?;
            outcome.extracted_content = Some(content);
        }

        Ok(outcome)
    }

    fn validate(&self, request: TranslationRequest) -> Result<TranslationJob> {
        if request.text.trim().is_empty() {
            return Err(Error::InvalidRequest("text is required".to_string()));
        }
        if request.target_language.trim().is_empty() {
            return Err(Error::InvalidRequest("target language is required".to_string()));
        }
        let limit = self.config.limits.max_text_chars;
        let size = request.text.chars().count();
        if size > limit {
            return Err(Error::PayloadTooLarge {
                what: "text",
                size,
                limit,
            });
        }

        let html = match (request.html, request.structure) {
            (Some(html), _) if !html.trim().is_empty() => html,
            (_, Some(structure)) if !structure.is_empty() => structure_html(&structure),
            _ => structure_text(&request.text).1,
        };
        let source = request
            .source_language
            .filter(|lang| !lang.trim().is_empty())
            .map_or_else(|| self.config.source_lang.clone(), Lang::from);
        let file_name = request
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

        Ok(TranslationJob {
            text: request.text,
            html,
            source,
            target: Lang::new(request.target_language.trim()),
            file_name,
        })
    }

    /// Validate the request and start a translation job; returns its id.
    ///
    /// Invalid requests are rejected before any job record exists.
    pub async fn start_translation(&self, request: TranslationRequest) -> Result<String> {
        let job = self.validate(request)?;
        let id = Uuid::new_v4().to_string();
        info!(
            "Starting translation {} of {} ({} chars) to {}",
            id,
            job.file_name,
            job.text.chars().count(),
            job.target
        );

        let handle = JobHandle::create(self.jobs.clone(), &id, JobKind::Translation).await;
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run_translation(handle, job).await });
        Ok(id)
    }

    async fn run_translation(&self, mut handle: JobHandle, job: TranslationJob) {
        if let Err(e) = self.translate_document(&mut handle, job).await {
            handle.fail(&e).await;
        }
    }

    async fn translate_document(&self, handle: &mut JobHandle, job: TranslationJob) -> Result<()> {
        let control = handle.control();

        handle
            .advance(
                JobState::Initializing,
                PROGRESS_INITIALIZING,
                "Initializing translation process...",
                "Initialization",
            )
            .await;

        let chunk_size = self.config.batch.chunk_size;
        let plan = match self.config.pipeline.reconcile {
            ReconcileMode::LineAligned => ChunkPlan::line_aligned(&job.text, chunk_size),
            ReconcileMode::Positional => ChunkPlan::positional(&job.text, chunk_size),
        };
        let total = plan.chunks.len();
        debug!("Job {}: {} chunks over {} lines", handle.id(), total, plan.lines.len());

        handle
            .advance(
                JobState::Translating,
                PROGRESS_TRANSLATING,
                &format!("Starting translation of {total} segments..."),
                "Translation",
            )
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let batch = self.batch.translate_batch(
            &plan.chunks,
            &job.source,
            &job.target,
            control.cancel_flag(),
            move |done, total| {
                let _ = tx.send((done, total));
            },
        );
        let progress = async {
            while let Some((done, total)) = rx.recv().await {
                handle
                    .chunks(done, total, translation_progress(done, total))
                    .await;
            }
        };
        let (report, ()) = tokio::join!(batch, progress);
        let report = report?;

        if report.fallbacks > 0 {
            warn!(
                "Job {}: {} of {} chunks kept their source text",
                handle.id(),
                report.fallbacks,
                total
            );
        }
        let translated = plan.assemble(&report.translations);

        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }
        handle
            .advance(
                JobState::ReconcilingHtml,
                PROGRESS_RECONCILING,
                "Creating translated HTML structure...",
                "HTML Generation",
            )
            .await;
        let reconciled = reconcile_html(&job.html, &job.text, &translated);

        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }
        handle
            .advance(
                JobState::GeneratingPdf,
                PROGRESS_GENERATING_PDF,
                "Generating PDF...",
                "PDF Generation",
            )
            .await;
        let mut output = TranslationOutput {
            result: translated,
            translated_html: reconciled.html,
            pdf_size: 0,
            cache_stats: self.cache.stats(),
            cache_hits: report.cache_hits,
            fallback_chunks: report.fallbacks,
            target_language: job.target.to_string(),
            file_name: job.file_name,
            pdf: Bytes::new(),
        };

        let rendered = self
            .renderer
            .render(&output.translated_html, &output.file_name)
            .await;
        match rendered {
            Ok(pdf) => {
                output.pdf_size = pdf.len();
                output.pdf = Bytes::from(pdf);
                handle.complete_translation(output).await;
            }
            // The text-only result stays readable on the failed record
            Err(e) => handle.fail_with_output(&e, output).await,
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Arc<JobRecord>> {
        self.jobs
            .get(id)
            .await
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// PDF of a completed translation job.
    pub async fn pdf(&self, id: &str) -> Result<PdfArtifact> {
        let record = self.get(id).await?;
        match &record.output {
            Some(output) if record.completed && !output.pdf.is_empty() => Ok(PdfArtifact {
                bytes: output.pdf.clone(),
                file_name: output.file_name.clone(),
            }),
            _ => Err(Error::JobNotReady(id.to_string())),
        }
    }

    /// Ask a running job to stop at its next batch boundary.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let record = self.get(id).await?;
        if !record.state.is_terminal() {
            info!("Cancelling job {}", id);
        }
        record.control.cancel();
        Ok(())
    }

    /// Delete a job, cancelling it if it is still running.
    pub async fn cleanup(&self, id: &str) -> Result<()> {
        let record = self.get(id).await?;
        // Flag first so the running task cannot republish after the delete
        record.control.remove();
        self.jobs.delete(id).await;
        info!("Cleaned up job {}", id);
        Ok(())
    }

    /// Poll a job until it reaches a terminal state, calling `on_update`
    /// whenever the record changes.
    pub async fn wait<F>(&self, id: &str, interval: Duration, mut on_update: F) -> Result<Arc<JobRecord>>
    where
        F: FnMut(&JobRecord),
    {
        let mut last_update = None;
        loop {
            let record = self.get(id).await?;
            if last_update != Some(record.updated_at) {
                last_update = Some(record.updated_at);
                on_update(&record);
            }
            if record.state.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active_jobs: self.jobs.active_count(),
            stored_jobs: self.jobs.len(),
            provider: self.batch.translator().info().name,
            renderer: self.renderer.name(),
            reconcile: self.config.pipeline.reconcile,
            limits: self.config.limits.clone(),
            chunk_size: self.config.batch.chunk_size,
            batch_size: self.config.batch.batch_size,
            rate_limit: self.limiter.snapshot(),
            cache: self.cache.stats(),
        }
    }
}

async fn run_extraction(mut job: JobHandle, bytes: Vec<u8>, file_name: String, limits: LimitsConfig) {
    job.advance(
        JobState::Initializing,
        PROGRESS_ANALYZING,
        "Analyzing PDF content...",
        "PDF Analysis",
    )
    .await;
    job.advance(
        JobState::Extracting,
        PROGRESS_EXTRACTING,
        "Extracting text from PDF...",
        "Text Extraction",
    )
    .await;

    match extract_with_timeout(bytes, file_name, &limits).await {
        Ok(content) => job.complete_extraction(content).await,
        Err(e) => job.fail(&e).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_line_aligned_plan_keeps_line_count() {
        let text = "--- Page 1 ---\nTITLE\n\nFirst sentence. Second sentence.\n--- Page 2 ---\nEnd.";
        let plan = ChunkPlan::line_aligned(text, 20);

        assert_eq!(plan.lines.len(), 5);
        assert_eq!(plan.lines[0], PlannedLine::Verbatim("--- Page 1 ---".to_string()));
        assert!(!plan.chunks.iter().any(|c| c.contains("--- Page")));

        let upper: Vec<String> = plan.chunks.iter().map(|c| c.to_uppercase()).collect();
        let assembled = plan.assemble(&upper);
        assert_eq!(
            assembled,
            "--- Page 1 ---\nTITLE\nFIRST SENTENCE. SECOND SENTENCE.\n--- Page 2 ---\nEND."
        );
    }

    #[test]
    fn test_positional_plan_joins_with_spaces() {
        let plan = ChunkPlan::positional("One.\nTwo.", 100);
        assert_eq!(plan.lines, vec![PlannedLine::Chunks(0..plan.chunks.len())]);
        let assembled = plan.assemble(&plan.chunks);
        assert!(!assembled.contains('\n'));
    }

    #[test]
    fn test_translation_progress_band() {
        assert_eq!(translation_progress(0, 4), 10);
        assert_eq!(translation_progress(2, 4), 47);
        assert_eq!(translation_progress(4, 4), 85);
        assert_eq!(translation_progress(0, 0), 85);
        assert_eq!(translation_progress(9, 4), 85);
    }

    #[test]
    fn test_request_deserializes_from_camel_case() {
        let request: TranslationRequest = serde_json::from_str(
            r#"{"text":"Hola","targetLanguage":"en","fileName":"a.txt",
                "structure":[{"type":"paragraph","content":"Hola","index":0}]}"#,
        )
        .unwrap();
        assert_eq!(request.target_language, "en");
        assert_eq!(request.file_name.as_deref(), Some("a.txt"));
        assert_eq!(request.structure.unwrap().len(), 1);
    }
}
