//! Job records and the store that pollers read them from.
//!
//! Every job has exactly one writer, a [`JobHandle`], which publishes a fresh
//! immutable snapshot (`Arc<JobRecord>`) on each change. Readers only ever see
//! whole records.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cache::CacheStats;
use crate::config::JobsConfig;
use crate::error::Error;
use crate::extract::ExtractedContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Extraction,
    Translation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Initializing,
    Extracting,
    Translating,
    ReconcilingHtml,
    GeneratingPdf,
    Completed,
    Failed,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Cancellation and removal flags shared by a job's writer and the pipeline.
#[derive(Debug, Default)]
pub struct JobControl {
    cancelled: AtomicBool,
    removed: AtomicBool,
}

impl JobControl {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// The flag polled by the batch translator.
    pub const fn cancel_flag(&self) -> &AtomicBool {
        &self.cancelled
    }

    /// Cancel and stop publishing; used when the job is cleaned up.
    pub fn remove(&self) {
        self.cancel();
        self.removed.store(true, Ordering::SeqCst);
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// Final artifacts of a translation job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutput {
    /// Translated plain text
    pub result: String,
    pub translated_html: String,
    pub pdf_size: usize,
    pub cache_stats: CacheStats,
    pub cache_hits: usize,
    pub fallback_chunks: usize,
    pub target_language: String,
    pub file_name: String,
    /// Served by the download operation only
    #[serde(skip)]
    pub pdf: Bytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    /// Human-readable description of the current phase
    pub stage: String,
    /// Short phase label
    pub step: String,
    pub progress: u8,
    pub completed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<ExtractedContent>,
    #[serde(flatten)]
    pub output: Option<TranslationOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub control: Arc<JobControl>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            state: JobState::Initializing,
            stage: "Initializing...".to_string(),
            step: "Initialization".to_string(),
            progress: 0,
            completed: false,
            failed: false,
            error: None,
            error_type: None,
            total_chunks: None,
            completed_chunks: None,
            extracted_content: None,
            output: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            control: Arc::new(JobControl::default()),
        }
    }

    pub fn has_pdf(&self) -> bool {
        self.output.as_ref().is_some_and(|o| !o.pdf.is_empty())
    }
}

/// Keyed store of job records with a retention TTL.
///
/// Cloning is cheap; clones share the same underlying store.
#[derive(Clone)]
pub struct JobStore {
    jobs: Cache<String, Arc<JobRecord>>,
}

impl JobStore {
    /// Records expire `retention` after their last write; at most `max_jobs`
    /// are kept, evicting the least recently used. New records are always
    /// admitted.
    pub fn new(retention: Duration, max_jobs: u64) -> Self {
        Self {
            jobs: Cache::builder()
                .max_capacity(max_jobs)
                .eviction_policy(EvictionPolicy::lru())
                .time_to_live(retention)
                .build(),
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(Duration::from_secs(config.retention_secs), config.max_jobs)
    }

    pub async fn set(&self, record: Arc<JobRecord>) {
        self.jobs.insert(record.id.clone(), record).await;
    }

    pub async fn get(&self, id: &str) -> Option<Arc<JobRecord>> {
        self.jobs.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Option<Arc<JobRecord>> {
        self.jobs.remove(id).await
    }

    /// Jobs that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|(_, record)| !record.state.is_terminal())
            .count()
    }

    /// Approximate number of stored records.
    pub fn len(&self) -> u64 {
        self.jobs.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The single writer of one job record.
///
/// Progress never decreases, and once the job completes or fails every
/// further write is ignored.
pub struct JobHandle {
    store: JobStore,
    record: JobRecord,
}

impl JobHandle {
    /// Register a new job and publish its initial record.
    pub async fn create(store: JobStore, id: impl Into<String>, kind: JobKind) -> Self {
        let record = JobRecord::new(id, kind);
        info!("Created {:?} job {}", kind, record.id);
        let handle = Self { store, record };
        handle.store.set(Arc::new(handle.record.clone())).await;
        handle
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.record.control)
    }

    async fn publish(&mut self) {
        if self.record.control.is_removed() {
            debug!("Job {} was removed, dropping update", self.record.id);
            return;
        }
        self.record.updated_at = Utc::now();
        self.store.set(Arc::new(self.record.clone())).await;
        // Removal may have landed while the write was in flight
        if self.record.control.is_removed() {
            self.store.delete(&self.record.id).await;
        }
    }

    /// Move to `state` with at least `progress` percent.
    pub async fn advance(&mut self, state: JobState, progress: u8, stage: &str, step: &str) {
        if self.record.state.is_terminal() {
            return;
        }
        self.record.state = state;
        self.record.progress = self.record.progress.max(progress.min(100));
        stage.clone_into(&mut self.record.stage);
        step.clone_into(&mut self.record.step);
        self.publish().await;
    }

    /// Record chunk progress while translating.
    pub async fn chunks(&mut self, completed: usize, total: usize, progress: u8) {
        if self.record.state.is_terminal() {
            return;
        }
        self.record.completed_chunks = Some(completed);
        self.record.total_chunks = Some(total);
        self.record.progress = self.record.progress.max(progress.min(100));
        self.record.stage = format!("Translating chunk {completed}/{total}...");
        self.publish().await;
    }

    pub async fn complete_extraction(&mut self, content: ExtractedContent) {
        if self.record.state.is_terminal() {
            return;
        }
        self.record.extracted_content = Some(content);
        self.finish_completed("Text extraction completed").await;
    }

    pub async fn complete_translation(&mut self, output: TranslationOutput) {
        if self.record.state.is_terminal() {
            return;
        }
        self.record.output = Some(output);
        self.finish_completed("Translation completed").await;
    }

    async fn finish_completed(&mut self, stage: &str) {
        self.record.state = JobState::Completed;
        self.record.progress = 100;
        self.record.completed = true;
        stage.clone_into(&mut self.record.stage);
        "Completed".clone_into(&mut self.record.step);
        self.record.completed_at = Some(Utc::now());
        info!("Job {} completed", self.record.id);
        self.publish().await;
    }

    /// Fail a translation whose text was produced but could not be rendered.
    pub async fn fail_with_output(&mut self, err: &Error, output: TranslationOutput) {
        if self.record.state.is_terminal() {
            return;
        }
        self.record.output = Some(output);
        self.fail(err).await;
    }

    /// Mark the job failed, keeping the progress reached so far.
    pub async fn fail(&mut self, err: &Error) {
        if self.record.state.is_terminal() {
            return;
        }
        error!("Job {} failed: {}", self.record.id, err);
        self.record.state = JobState::Failed;
        self.record.failed = true;
        self.record.error = Some(err.to_string());
        self.record.error_type = Some(err.kind());
        self.record.stage = format!("Failed: {err}");
        "Error".clone_into(&mut self.record.step);
        self.record.failed_at = Some(Utc::now());
        self.publish().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(Duration::from_secs(3600), 100)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = store();
        let record = Arc::new(JobRecord::new("job-1", JobKind::Translation));
        store.set(Arc::clone(&record)).await;

        assert_eq!(store.get("job-1").await.unwrap().id, "job-1");
        assert!(store.get("missing").await.is_none());
        assert!(store.delete("job-1").await.is_some());
        assert!(store.get("job-1").await.is_none());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = store();
        let mut job = JobHandle::create(store.clone(), "j", JobKind::Translation).await;

        job.advance(JobState::Translating, 40, "Translating...", "Translation").await;
        job.advance(JobState::Translating, 20, "Translating...", "Translation").await;
        assert_eq!(store.get("j").await.unwrap().progress, 40);

        job.chunks(3, 4, 30).await;
        let record = store.get("j").await.unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.completed_chunks, Some(3));
    }

    #[tokio::test]
    async fn test_failure_keeps_progress_and_is_terminal() {
        let store = store();
        let mut job = JobHandle::create(store.clone(), "j", JobKind::Translation).await;
        job.advance(JobState::GeneratingPdf, 93, "Generating PDF...", "PDF Generation").await;
        job.fail(&Error::RenderFailed("chromium exited".to_string())).await;

        let record = store.get("j").await.unwrap();
        assert!(record.failed && !record.completed);
        assert_eq!(record.progress, 93);
        assert_eq!(record.error_type, Some("render_failed"));
        assert!(record.output.is_none());

        // Terminal: later writes are ignored
        job.complete_extraction(crate::extract::ExtractedContent::from_text(
            String::new(),
            "direct",
            crate::extract::DocumentMetadata::default(),
        ))
        .await;
        let record = store.get("j").await.unwrap();
        assert!(!record.completed);
        assert!(record.extracted_content.is_none());
    }

    #[tokio::test]
    async fn test_removed_job_is_not_republished() {
        let store = store();
        let mut job = JobHandle::create(store.clone(), "j", JobKind::Translation).await;
        job.control().remove();
        store.delete("j").await;

        job.fail(&Error::Cancelled).await;
        assert!(store.get("j").await.is_none());
        assert!(job.control().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cleanup_racing_a_publish_leaves_nothing() {
        let store = store();
        for i in 0..200 {
            let id = format!("race-{i}");
            let mut job = JobHandle::create(store.clone(), &id, JobKind::Translation).await;
            let control = job.control();

            let writer = tokio::spawn(async move {
                for progress in 10..20 {
                    job.advance(JobState::Translating, progress, "Translating...", "Translation")
                        .await;
                }
            });
            let cleaner = {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    control.remove();
                    store.delete(&id).await;
                })
            };
            writer.await.unwrap();
            cleaner.await.unwrap();

            assert!(store.get(&id).await.is_none(), "{id} came back");
        }
    }

    #[tokio::test]
    async fn test_full_store_admits_new_jobs() {
        let store = JobStore::new(Duration::from_secs(3600), 3);
        for id in ["a", "b", "c"] {
            store.set(Arc::new(JobRecord::new(id, JobKind::Translation))).await;
        }
        for _ in 0..5 {
            for id in ["a", "b", "c"] {
                assert!(store.get(id).await.is_some());
            }
        }
        store.jobs.run_pending_tasks().await;

        store.set(Arc::new(JobRecord::new("fresh", JobKind::Translation))).await;
        store.jobs.run_pending_tasks().await;

        assert!(store.get("fresh").await.is_some());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_serialization_shape() {
        let mut record = JobRecord::new("j", JobKind::Translation);
        record.output = Some(TranslationOutput {
            result: "Hello".to_string(),
            translated_html: "<p>Hello</p>".to_string(),
            pdf_size: 3,
            cache_stats: CacheStats::default(),
            cache_hits: 0,
            fallback_chunks: 0,
            target_language: "en".to_string(),
            file_name: "a.txt".to_string(),
            pdf: Bytes::from_static(b"%PD"),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "initializing");
        assert_eq!(json["kind"], "translation");
        assert_eq!(json["translatedHtml"], "<p>Hello</p>");
        assert_eq!(json["pdfSize"], 3);
        assert!(json.get("pdf").is_none());
        assert!(json.get("error").is_none());
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
        assert!(record.has_pdf());
    }

    #[tokio::test]
    async fn test_active_count() {
        let store = store();
        let _running = JobHandle::create(store.clone(), "a", JobKind::Translation).await;
        let mut done = JobHandle::create(store.clone(), "b", JobKind::Extraction).await;
        done.fail(&Error::Cancelled).await;
        assert_eq!(store.active_count(), 1);
    }
}
