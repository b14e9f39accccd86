mod disk;
mod key;
mod memory;

pub use disk::DiskCache;
pub use key::CacheKey;
pub use memory::MemoryCache;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::config::{CacheConfig, Lang};
use crate::error::Result;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently held in memory
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit percentage (0-100)
    pub hit_rate: f64,
}

/// Translation cache: a bounded FIFO memory layer with an optional disk layer.
///
/// Safe to share between concurrent translation jobs.
pub struct TranslationCache {
    memory: MemoryCache,
    disk: Option<DiskCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranslationCache {
    /// Create a new translation cache from configuration
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let disk = if config.disk_enabled {
            let path = config
                .disk_path
                .clone()
                .unwrap_or_else(crate::util::translation_cache_path);
            Some(DiskCache::new(path)?)
        } else {
            None
        };

        Ok(Self {
            memory: MemoryCache::new(config.max_entries),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Memory-only cache holding at most `max_entries` translations.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            memory: MemoryCache::new(max_entries),
            disk: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a previous translation of `text` into `target`.
    pub fn get(&self, text: &str, target: &Lang) -> Option<String> {
        let key = CacheKey::new(text, target);

        let found = self.memory.get(key.as_str()).or_else(|| {
            let value = self.disk.as_ref()?.get(key.as_str())?;
            // Promote disk hits into memory
            self.memory.insert(key.to_string(), value.clone());
            Some(value)
        });

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store the translation of `text` into `target`.
    pub fn put(&self, text: &str, target: &Lang, translation: &str) {
        let key = CacheKey::new(text, target);

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.insert(key.as_str(), translation)
        {
            warn!("Failed to persist cached translation: {}", e);
        }

        self.memory.insert(key.to_string(), translation.to_string());
    }

    /// Flush the disk layer, if any.
    pub fn flush(&self) {
        if let Some(ref disk) = self.disk
            && let Err(e) = disk.flush()
        {
            warn!("Failed to flush translation cache: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)] // Counters stay far below 2^52
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        };

        CacheStats {
            size: self.memory.len(),
            hits,
            misses,
            hit_rate,
        }
    }

    /// Clear all layers and reset statistics.
    pub fn clear(&self) {
        self.memory.clear();

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.clear()
        {
            warn!("Failed to clear disk cache: {}", e);
        }

        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
