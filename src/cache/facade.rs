use crate::cache::budget::{classify, CacheBudget, DeviceClass, MemoryProbe, SystemProbe};
use crate::cache::config::CacheConfig;
use crate::cache::disk::{DiskTier, SweepReport};
use crate::cache::key::CacheKey;
use crate::cache::memory::MemoryTier;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::pressure::{MemoryWarning, PressureAction, PressureController, PressureState};
use crate::codec::{Image, ImageCodec, JpegCodec};
use crate::errors::CacheError;
use crate::utils::num::{bytes_to_gib, scale_bytes};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Read-only view of the cache, recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub disk_used_bytes: u64,
    pub disk_max_bytes: u64,
    pub memory_entry_limit: u32,
    pub memory_max_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_entries: usize,
    pub under_pressure: bool,
    pub pressure_event_count: u32,
    pub device_memory_gb: f64,
}

#[derive(Default)]
struct Inflight {
    next: u64,
    tickets: HashMap<CacheKey, u64>,
}

/// Orders disk writes against removals. Each scheduled write holds a ticket
/// for its key; it only lands if that ticket is still the key's latest when
/// the write runs. `remove` revokes one key, `clear_all` and escalation
/// revoke every key. Only keys with a write pending are tracked.
#[derive(Default)]
struct DiskGate {
    lock: RwLock<()>,
    inflight: Mutex<Inflight>,
}

impl DiskGate {
    fn schedule(&self, key: CacheKey) -> u64 {
        let mut st = self.inflight.lock();
        st.next += 1;
        let ticket = st.next;
        st.tickets.insert(key, ticket);
        ticket
    }

    /// Consume the ticket; false if it was revoked or superseded.
    fn claim(&self, key: &CacheKey, ticket: u64) -> bool {
        let mut st = self.inflight.lock();
        if st.tickets.get(key) == Some(&ticket) {
            st.tickets.remove(key);
            true
        } else {
            false
        }
    }

    fn revoke(&self, key: &CacheKey) {
        self.inflight.lock().tickets.remove(key);
    }

    fn revoke_all(&self) {
        self.inflight.lock().tickets.clear();
    }
}

/// Background disk work that has been scheduled but not finished.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

struct CacheInner {
    budget: CacheBudget,
    device_class: DeviceClass,
    physical_memory: u64,
    quota_target: u64,
    encode_quality: f32,
    memory: MemoryTier,
    disk: Arc<DiskTier>,
    pressure: Arc<PressureController>,
    codec: Arc<dyn ImageCodec>,
    metrics: Arc<CacheMetrics>,
    gate: Arc<DiskGate>,
    pending: Arc<Pending>,
    rt: Handle,
}

/// Two-tier image cache: a bounded in-memory LRU in front of a directory of
/// encoded images.
///
/// Construct one per application and hand clones to every consumer; clones
/// share state. Lookups take the source identifier (normally the URL) and
/// derive the [`CacheKey`] internally.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<CacheInner>,
}

impl ImageCache {
    /// Open a cache with the JPEG codec and the system memory probe, scheduling
    /// background work on the current tokio runtime.
    ///
    /// # Errors
    /// Fails outside a tokio runtime, on invalid config, or if the cache
    /// directory cannot be created.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        Self::open_with(config, Arc::new(JpegCodec), &SystemProbe)
    }

    /// # Errors
    /// See [`ImageCache::open`].
    pub fn open_with(
        config: CacheConfig,
        codec: Arc<dyn ImageCodec>,
        probe: &dyn MemoryProbe,
    ) -> Result<Self, CacheError> {
        let rt = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Self::open_on(rt, config, codec, probe)
    }

    /// # Errors
    /// Fails on invalid config or if the cache directory cannot be created.
    pub fn open_on(
        rt: Handle,
        config: CacheConfig,
        codec: Arc<dyn ImageCodec>,
        probe: &dyn MemoryProbe,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let physical_memory =
            config.physical_memory_bytes.unwrap_or_else(|| probe.physical_memory_bytes());
        let device_class = DeviceClass::from_physical_memory(physical_memory);
        let budget = config.apply_overrides(classify(physical_memory));

        let metrics = Arc::new(CacheMetrics::default());
        let disk = Arc::new(DiskTier::open(&config.cache_dir, metrics.clone())?);
        let memory =
            MemoryTier::new(budget.memory_bytes, budget.max_memory_entries, metrics.clone());

        let cache = Self {
            inner: Arc::new(CacheInner {
                budget,
                device_class,
                physical_memory,
                quota_target: scale_bytes(budget.disk_bytes, config.quota_target_ratio),
                encode_quality: config.encode_quality,
                memory,
                disk,
                pressure: PressureController::new(config.pressure_policy()),
                codec,
                metrics,
                gate: Arc::new(DiskGate::default()),
                pending: Arc::new(Pending::default()),
                rt,
            }),
        };

        log::info!(
            target: "imgtier::cache",
            "opened {} ({device_class:?}, memory {} B / {} entries, disk {} B)",
            config.cache_dir.display(),
            budget.memory_bytes,
            budget.max_memory_entries,
            budget.disk_bytes
        );

        if config.expiry_sweep_on_open {
            let disk = cache.inner.disk.clone();
            let max_age = Duration::from_secs(budget.max_age_secs);
            cache.spawn_disk(move || {
                let report = disk.expiry_sweep(max_age);
                if report.removed > 0 {
                    log::info!(target: "imgtier::cache", "expired {} entries", report.removed);
                }
            });
        }
        Ok(cache)
    }

    #[must_use]
    pub fn budget(&self) -> CacheBudget {
        self.inner.budget
    }

    #[must_use]
    pub fn device_class(&self) -> DeviceClass {
        self.inner.device_class
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.inner.disk.dir()
    }

    /// The codec used for the disk tier; loaders decode fetched bytes with it.
    #[must_use]
    pub fn codec(&self) -> Arc<dyn ImageCodec> {
        self.inner.codec.clone()
    }

    #[must_use]
    pub fn pressure_state(&self) -> PressureState {
        self.inner.pressure.state()
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Whether `key` is resident in the memory tier (recency untouched).
    #[must_use]
    pub fn in_memory(&self, key: &str) -> bool {
        self.inner.memory.contains(&CacheKey::derive(key))
    }

    /// Memory tier first, then disk. A disk hit is decoded and promoted into
    /// memory, also while under pressure. Never touches the network.
    pub fn get(&self, key: &str) -> Option<Image> {
        let ck = CacheKey::derive(key);
        if let Some(img) = self.memory_hit(&ck) {
            return Some(img);
        }
        let inner = &self.inner;
        let found = load_from_disk(&inner.disk, inner.codec.as_ref(), &inner.metrics, &ck);
        self.finish_disk_lookup(ck, found)
    }

    /// Like [`get`](Self::get) but performs the disk read on the blocking pool.
    pub async fn get_async(&self, key: &str) -> Option<Image> {
        let ck = CacheKey::derive(key);
        if let Some(img) = self.memory_hit(&ck) {
            return Some(img);
        }
        let disk = self.inner.disk.clone();
        let codec = self.inner.codec.clone();
        let metrics = self.inner.metrics.clone();
        let found = self
            .inner
            .rt
            .spawn_blocking(move || load_from_disk(&disk, codec.as_ref(), &metrics, &ck))
            .await
            .unwrap_or(None);
        self.finish_disk_lookup(ck, found)
    }

    fn memory_hit(&self, ck: &CacheKey) -> Option<Image> {
        let img = self.inner.memory.get(ck)?;
        CacheMetrics::bump(&self.inner.metrics.memory_hits);
        Some(img)
    }

    fn finish_disk_lookup(&self, ck: CacheKey, found: Option<Image>) -> Option<Image> {
        match found {
            Some(img) => {
                CacheMetrics::bump(&self.inner.metrics.disk_hits);
                self.inner.memory.put(ck, img.clone(), img.cost_bytes());
                Some(img)
            }
            None => {
                CacheMetrics::bump(&self.inner.metrics.misses);
                None
            }
        }
    }

    /// Store `image` under `key`. The memory write (skipped while under
    /// pressure) is visible when this returns; encoding and the disk write
    /// happen afterwards on the blocking pool, followed by a quota sweep if
    /// the directory has grown past its budget.
    pub fn set(&self, key: &str, image: Image) {
        let ck = CacheKey::derive(key);
        CacheMetrics::bump(&self.inner.metrics.inserts);
        if self.inner.pressure.under_pressure() {
            CacheMetrics::bump(&self.inner.metrics.pressure_skipped_inserts);
        } else {
            self.inner.memory.put(ck, image.clone(), image.cost_bytes());
        }

        let disk = self.inner.disk.clone();
        let codec = self.inner.codec.clone();
        let metrics = self.inner.metrics.clone();
        let gate = self.inner.gate.clone();
        let ticket = gate.schedule(ck);
        let quality = self.inner.encode_quality;
        let disk_max = self.inner.budget.disk_bytes;
        let target = self.inner.quota_target;
        self.spawn_disk(move || {
            let bytes = match codec.encode(&image, quality) {
                Ok(b) => b,
                Err(e) => {
                    gate.claim(&ck, ticket);
                    CacheMetrics::bump(&metrics.disk_write_failures);
                    log::warn!(target: "imgtier::cache", "encode {ck} failed: {e}");
                    return;
                }
            };
            {
                let _held = gate.lock.read();
                if !gate.claim(&ck, ticket) {
                    log::debug!(target: "imgtier::cache", "dropping stale write for {ck}");
                    return;
                }
                if let Err(e) = disk.save(&ck, &bytes) {
                    CacheMetrics::bump(&metrics.disk_write_failures);
                    log::warn!(target: "imgtier::cache", "disk write {ck} failed: {e}");
                    return;
                }
            }
            if disk.total_size() > disk_max {
                let report = disk.quota_sweep(target);
                log::debug!(
                    target: "imgtier::cache",
                    "quota sweep removed {} entries, {} B remain",
                    report.removed,
                    report.remaining_bytes
                );
            }
        });
    }

    /// Drop `key` from both tiers. A disk write for `key` that is still
    /// pending is discarded; other keys are unaffected.
    pub fn remove(&self, key: &str) {
        let ck = CacheKey::derive(key);
        CacheMetrics::bump(&self.inner.metrics.removes);
        self.inner.memory.remove(&ck);
        let _held = self.inner.gate.lock.write();
        self.inner.gate.revoke(&ck);
        if let Err(e) = self.inner.disk.remove(&ck) {
            log::warn!(target: "imgtier::cache", "disk remove {ck} failed: {e}");
        }
    }

    /// Empty both tiers and recreate the cache directory.
    pub fn clear_all(&self) {
        self.inner.memory.remove_all();
        let _held = self.inner.gate.lock.write();
        self.inner.gate.revoke_all();
        if let Err(e) = self.inner.disk.remove_all() {
            log::warn!(target: "imgtier::cache", "clearing disk tier failed: {e}");
        }
        log::info!(target: "imgtier::cache", "cache cleared");
    }

    /// Bytes currently used by the disk tier.
    pub async fn cache_size(&self) -> u64 {
        let disk = self.inner.disk.clone();
        self.inner.rt.spawn_blocking(move || disk.total_size()).await.unwrap_or(0)
    }

    pub async fn statistics(&self) -> CacheStatistics {
        let disk_used_bytes = self.cache_size().await;
        let inner = &self.inner;
        CacheStatistics {
            disk_used_bytes,
            disk_max_bytes: inner.budget.disk_bytes,
            memory_entry_limit: inner.budget.max_memory_entries,
            memory_max_bytes: inner.budget.memory_bytes,
            memory_used_bytes: inner.memory.used_bytes(),
            memory_entries: inner.memory.len(),
            under_pressure: inner.pressure.under_pressure(),
            pressure_event_count: inner.pressure.event_count(),
            device_memory_gb: bytes_to_gib(inner.physical_memory),
        }
    }

    /// Run the age-based sweep now and wait for it.
    pub async fn sweep_expired(&self) -> SweepReport {
        let disk = self.inner.disk.clone();
        let max_age = Duration::from_secs(self.inner.budget.max_age_secs);
        self.inner.rt.spawn_blocking(move || disk.expiry_sweep(max_age)).await.unwrap_or_default()
    }

    /// Trim the disk tier to its quota target now and wait for it.
    pub async fn sweep_quota(&self) -> SweepReport {
        let disk = self.inner.disk.clone();
        let target = self.inner.quota_target;
        self.inner.rt.spawn_blocking(move || disk.quota_sweep(target)).await.unwrap_or_default()
    }

    /// React to one host low-memory warning.
    pub fn handle_memory_warning(&self) -> PressureAction {
        let action = self.inner.pressure.signal(&self.inner.rt);
        let dropped = self.inner.memory.remove_all();
        log::info!(target: "imgtier::cache", "memory warning: dropped {dropped} in-memory images");
        if action == PressureAction::ClearMemoryAndDisk {
            self.inner.gate.revoke_all();
            let disk = self.inner.disk.clone();
            let gate = self.inner.gate.clone();
            self.spawn_disk(move || {
                let _held = gate.lock.write();
                if let Err(e) = disk.remove_all() {
                    log::warn!(target: "imgtier::cache", "pressure disk clear failed: {e}");
                }
            });
            log::warn!(target: "imgtier::cache", "repeated memory warnings: disk tier cleared");
        }
        action
    }

    /// Feed host warnings from `events` into this cache. The listener stops
    /// when the channel closes or the cache is dropped.
    pub fn listen(&self, mut events: mpsc::Receiver<MemoryWarning>) -> JoinHandle<()> {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        self.inner.rt.spawn(async move {
            while events.recv().await.is_some() {
                let Some(inner) = weak.upgrade() else { break };
                ImageCache { inner }.handle_memory_warning();
            }
        })
    }

    /// Wait until every scheduled disk write and sweep has finished.
    pub async fn flush(&self) {
        let pending = self.inner.pending.clone();
        loop {
            let notified = pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if pending.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn spawn_disk<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.pending.count.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.inner.pending.clone());
        self.inner.rt.spawn_blocking(move || {
            let _guard = guard;
            work();
        });
    }
}

/// Disk read + decode. Unreadable and undecodable entries are misses; the
/// latter are deleted so they are not read again.
fn load_from_disk(
    disk: &DiskTier,
    codec: &dyn ImageCodec,
    metrics: &CacheMetrics,
    key: &CacheKey,
) -> Option<Image> {
    let bytes = match disk.load(key) {
        Ok(Some(b)) => b,
        Ok(None) => return None,
        Err(e) => {
            CacheMetrics::bump(&metrics.disk_read_failures);
            log::warn!(target: "imgtier::cache", "disk read {key} failed: {e}");
            return None;
        }
    };
    match codec.decode(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            CacheMetrics::bump(&metrics.disk_read_failures);
            log::warn!(target: "imgtier::cache", "discarding undecodable entry {key}: {e}");
            if let Err(e) = disk.remove(key) {
                log::warn!(target: "imgtier::cache", "deleting undecodable {key} failed: {e}");
            }
            None
        }
    }
}
