use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observing cache behavior. Shared between the facade, both tiers
/// and background tasks.
#[derive(Default, Debug)]
pub struct CacheMetrics {
    pub memory_hits: AtomicU64,
    pub disk_hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    pub removes: AtomicU64,
    pub memory_evictions: AtomicU64,
    pub pressure_skipped_inserts: AtomicU64,
    pub disk_writes: AtomicU64,
    pub disk_write_failures: AtomicU64,
    pub disk_read_failures: AtomicU64,
    pub expired_removed: AtomicU64,
    pub quota_removed: AtomicU64,
    pub quota_sweeps: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
            pressure_skipped_inserts: self.pressure_skipped_inserts.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
            disk_read_failures: self.disk_read_failures.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            quota_removed: self.quota_removed.load(Ordering::Relaxed),
            quota_sweeps: self.quota_sweeps.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheMetricsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub removes: u64,
    pub memory_evictions: u64,
    pub pressure_skipped_inserts: u64,
    pub disk_writes: u64,
    pub disk_write_failures: u64,
    pub disk_read_failures: u64,
    pub expired_removed: u64,
    pub quota_removed: u64,
    pub quota_sweeps: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of lookups served by either tier (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }
}
