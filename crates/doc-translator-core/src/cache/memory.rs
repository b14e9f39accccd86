use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-memory translation cache bounded by entry count.
///
/// Eviction is FIFO: once `max_entries` entries are held, the oldest inserted
/// entry is dropped before a new key is added. Overwriting an existing key
/// keeps its original insertion position.
pub struct MemoryCache {
    inner: Mutex<Fifo>,
    max_entries: usize,
}

#[derive(Default)]
struct Fifo {
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Fifo::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().map.get(key).cloned()
    }

    pub fn insert(&self, key: String, value: String) {
        let mut fifo = self.lock();

        if let Some(existing) = fifo.map.get_mut(&key) {
            *existing = value;
            return;
        }

        while fifo.map.len() >= self.max_entries {
            let Some(oldest) = fifo.order.pop_front() else {
                break;
            };
            fifo.map.remove(&oldest);
        }

        fifo.order.push_back(key.clone());
        fifo.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut fifo = self.lock();
        fifo.map.clear();
        fifo.order.clear();
    }

    /// The map is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, Fifo> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
