//! Cache-aware, rate-limited batch translation of chunks.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TranslationCache;
use crate::config::{AppConfig, Lang};
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::translator::Translator;

/// Outcome of a batch run. `translations[i]` corresponds to `chunks[i]`.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub translations: Vec<String>,
    /// Chunks answered from the cache
    pub cache_hits: usize,
    /// Chunks that kept their source text after the provider failed
    pub fallbacks: usize,
}

pub struct BatchTranslator {
    translator: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    batch_pause: Duration,
}

impl BatchTranslator {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        batch_size: usize,
        batch_pause: Duration,
    ) -> Self {
        Self {
            translator,
            cache,
            limiter,
            retry,
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    /// Build from the `retry` and `batch` config sections.
    pub fn from_config(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        limiter: Arc<RateLimiter>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            translator,
            cache,
            limiter,
            RetryPolicy::from_config(&config.retry),
            config.batch.batch_size,
            Duration::from_millis(config.batch.batch_pause_ms),
        )
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    /// Translate `chunks` in order.
    ///
    /// Provider failures never surface: a chunk that cannot be translated
    /// keeps its source text. The only error is [`Error::Cancelled`], raised
    /// when `cancel` is set at a batch boundary. `on_progress(done, total)`
    /// fires after the cache pass and after every batch.
    pub async fn translate_batch<F>(
        &self,
        chunks: &[String],
        source: &Lang,
        target: &Lang,
        cancel: &AtomicBool,
        on_progress: F,
    ) -> Result<BatchReport>
    where
        F: Fn(usize, usize) + Sync,
    {
        let total = chunks.len();
        let mut results: Vec<Option<String>> = vec![None; total];
        let mut pending = Vec::new();
        let mut cache_hits = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.trim().is_empty() {
                results[i] = Some(chunk.clone());
            } else if let Some(hit) = self.cache.get(chunk, target) {
                debug!("Cache hit for chunk {}", i);
                results[i] = Some(hit);
                cache_hits += 1;
            } else {
                pending.push(i);
            }
        }

        let mut done = total - pending.len();
        on_progress(done, total);

        if !pending.is_empty() {
            info!(
                "Translating {} chunks ({} cached) in batches of {}",
                pending.len(),
                cache_hits,
                self.batch_size
            );
        }

        let mut fallbacks = 0;
        let batch_count = pending.len().div_ceil(self.batch_size);

        for (batch_num, batch) in pending.chunks(self.batch_size).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                info!("Batch translation cancelled after {}/{} chunks", done, total);
                return Err(Error::Cancelled);
            }

            let permits = u32::try_from(batch.len()).unwrap_or(u32::MAX);
            self.limiter.acquire_many(permits).await;

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|&i| self.translate_chunk(i, &chunks[i], source, target)),
            )
            .await;

            for (&i, outcome) in batch.iter().zip(outcomes) {
                let translated = match outcome {
                    Some(text) => text,
                    None => {
                        fallbacks += 1;
                        chunks[i].clone()
                    }
                };
                results[i] = Some(translated);
            }

            done += batch.len();
            on_progress(done, total);

            if batch_num + 1 < batch_count && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        self.cache.flush();

        let translations = results
            .into_iter()
            .zip(chunks)
            .map(|(translated, chunk)| translated.unwrap_or_else(|| chunk.clone()))
            .collect();

        Ok(BatchReport {
            translations,
            cache_hits,
            fallbacks,
        })
    }

    /// Translate one chunk with retries. `None` means fall back to the source.
    async fn translate_chunk(
        &self,
        index: usize,
        chunk: &str,
        source: &Lang,
        target: &Lang,
    ) -> Option<String> {
        match self
            .retry
            .run(|| self.translator.translate(chunk, source, target))
            .await
        {
            Ok(translated) => {
                self.cache.put(chunk, target, &translated);
                Some(translated)
            }
            Err(e) => {
                warn!("Chunk {} left untranslated: {}", index, e);
                None
            }
        }
    }
}
