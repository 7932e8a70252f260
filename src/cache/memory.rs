//! In-process image tier bounded by total byte cost and entry count.
//!
//! Eviction is strict LRU: a successful `get` or a `put` makes the entry most
//! recently used, and when either limit would be exceeded entries are dropped
//! from the least recently used end until the new entry fits.

use crate::cache::key::CacheKey;
use crate::cache::metrics::CacheMetrics;
use crate::codec::Image;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;

struct Slot {
    image: Image,
    cost: u64,
}

struct MemoryState {
    lru: LruCache<CacheKey, Slot>,
    used_bytes: u64,
    max_bytes: u64,
    max_entries: usize,
}

impl MemoryState {
    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (key, slot) = self.lru.pop_lru()?;
        self.used_bytes = self.used_bytes.saturating_sub(slot.cost);
        Some(key)
    }
}

pub struct MemoryTier {
    state: Mutex<MemoryState>,
    metrics: Arc<CacheMetrics>,
}

impl MemoryTier {
    #[must_use]
    pub fn new(max_bytes: u64, max_entries: u32, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                lru: LruCache::unbounded(),
                used_bytes: 0,
                max_bytes,
                max_entries: max_entries as usize,
            }),
            metrics,
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Image> {
        self.state.lock().lru.get(key).map(|slot| slot.image.clone())
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &CacheKey) -> Option<Image> {
        self.state.lock().lru.peek(key).map(|slot| slot.image.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().lru.contains(key)
    }

    /// Insert `image` at `cost_bytes`. Returns false when the entry can never
    /// fit (larger than the byte limit, or a zero entry limit); any previous
    /// entry under `key` is dropped in that case too.
    pub fn put(&self, key: CacheKey, image: Image, cost_bytes: u64) -> bool {
        let mut st = self.state.lock();
        if let Some(old) = st.lru.pop(&key) {
            st.used_bytes = st.used_bytes.saturating_sub(old.cost);
        }
        if cost_bytes > st.max_bytes || st.max_entries == 0 {
            return false;
        }

        let mut evicted = 0u64;
        let mut freed = 0u64;
        while st.lru.len() >= st.max_entries || st.used_bytes + cost_bytes > st.max_bytes {
            let before = st.used_bytes;
            if st.evict_lru().is_none() {
                break;
            }
            evicted += 1;
            freed += before - st.used_bytes;
        }
        st.used_bytes += cost_bytes;
        st.lru.put(key, Slot { image, cost: cost_bytes });
        drop(st);

        if evicted > 0 {
            CacheMetrics::add(&self.metrics.memory_evictions, evicted);
            crate::cache_trace!(
                "{{\"tier\":\"memory\",\"op\":\"evict\",\"entries\":{},\"freed_bytes\":{}}}",
                evicted,
                freed
            );
        }
        true
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Image> {
        let mut st = self.state.lock();
        let slot = st.lru.pop(key)?;
        st.used_bytes = st.used_bytes.saturating_sub(slot.cost);
        Some(slot.image)
    }

    /// Drop every entry; returns how many were held.
    pub fn remove_all(&self) -> usize {
        let mut st = self.state.lock();
        let n = st.lru.len();
        st.lru.clear();
        st.used_bytes = 0;
        n
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    /// Keys from least to most recently used.
    #[must_use]
    pub fn keys_lru_first(&self) -> Vec<CacheKey> {
        self.state.lock().lru.iter().rev().map(|(k, _)| *k).collect()
    }
}
