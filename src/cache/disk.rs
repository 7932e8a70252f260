//! Persistent tier: one file per entry under a private cache directory.
//!
//! The directory listing is the index. A file's modification time serves as
//! both its write time and its last access time (`load` touches it), and its
//! size comes from filesystem metadata. Enumeration is O(entries), so
//! `total_size` and both sweeps belong off the hot path.

use crate::cache::key::CacheKey;
use crate::cache::metrics::CacheMetrics;
use crate::errors::CacheError;
use crate::utils::fsutil;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Interrupted writes leave temp files behind; they are reclaimed once this old.
const STALE_TEMP_AGE: Duration = Duration::from_secs(10 * 60);

/// One file in the cache directory.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Outcome of an expiry or quota sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

pub struct DiskTier {
    dir: PathBuf,
    metrics: Arc<CacheMetrics>,
}

impl DiskTier {
    /// Open (and create if needed) the cache directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P, metrics: Arc<CacheMetrics>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, metrics })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.to_hex())
    }

    /// Read the stored bytes for `key` and mark the entry as recently used.
    ///
    /// # Errors
    /// Returns an error for any read failure other than the file being absent.
    pub fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = fsutil::set_modified(&path, SystemTime::now()) {
            log::debug!(target: "imgtier::disk", "touch {key} failed: {e}");
        }
        Ok(Some(bytes))
    }

    /// Write (or overwrite) the entry for `key`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        // The directory may have been wiped by a concurrent clear.
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir)?;
        }
        fsutil::write_atomic(&self.path_for(key), bytes)?;
        CacheMetrics::bump(&self.metrics.disk_writes);
        Ok(())
    }

    /// Returns whether a file was removed.
    ///
    /// # Errors
    /// Returns any error other than the file being absent.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Wipe the directory and recreate it empty.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be removed or recreated.
    pub fn remove_all(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// All finished entries. Files whose names are not cache keys are skipped.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn entries(&self) -> Result<Vec<DiskEntry>, CacheError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in read.flatten() {
            let Some(key) = entry.file_name().to_str().and_then(|n| n.parse::<CacheKey>().ok())
            else {
                continue;
            };
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            out.push(DiskEntry {
                key,
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
            });
        }
        Ok(out)
    }

    /// Sum of entry sizes; unreadable entries count as zero.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        match self.entries() {
            Ok(entries) => entries.iter().map(|e| e.size).sum(),
            Err(e) => {
                log::warn!(target: "imgtier::disk", "listing {} failed: {e}", self.dir.display());
                0
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry last modified more than `max_age` ago, plus temp files
    /// abandoned by interrupted writes.
    pub fn expiry_sweep(&self, max_age: Duration) -> SweepReport {
        self.expiry_sweep_at(SystemTime::now(), max_age)
    }

    /// [`expiry_sweep`](Self::expiry_sweep) against an explicit clock reading.
    pub fn expiry_sweep_at(&self, now: SystemTime, max_age: Duration) -> SweepReport {
        let entries = match self.entries() {
            Ok(e) => e,
            Err(e) => {
                log::warn!(target: "imgtier::disk", "expiry sweep skipped: {e}");
                return SweepReport::default();
            }
        };
        let cutoff = now.checked_sub(max_age).unwrap_or(UNIX_EPOCH);
        let mut report = SweepReport { scanned: entries.len(), ..SweepReport::default() };
        for entry in entries {
            if entry.modified < cutoff && fsutil::remove_if_exists(&entry.path).is_ok() {
                report.removed += 1;
                report.freed_bytes += entry.size;
            } else {
                report.remaining_bytes += entry.size;
            }
        }
        self.reclaim_temp_files(now);

        CacheMetrics::add(&self.metrics.expired_removed, report.removed as u64);
        crate::cache_trace!(
            "{{\"tier\":\"disk\",\"op\":\"expiry_sweep\",\"scanned\":{},\"removed\":{},\"freed_bytes\":{}}}",
            report.scanned,
            report.removed,
            report.freed_bytes
        );
        report
    }

    /// Remove entries oldest-modified first until the remaining total is at most
    /// `target_bytes`.
    pub fn quota_sweep(&self, target_bytes: u64) -> SweepReport {
        let mut entries = match self.entries() {
            Ok(e) => e,
            Err(e) => {
                log::warn!(target: "imgtier::disk", "quota sweep skipped: {e}");
                return SweepReport::default();
            }
        };
        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));

        let mut remaining: u64 = entries.iter().map(|e| e.size).sum();
        let mut report = SweepReport { scanned: entries.len(), ..SweepReport::default() };
        for entry in &entries {
            if remaining <= target_bytes {
                break;
            }
            match fsutil::remove_if_exists(&entry.path) {
                Ok(()) => {
                    remaining = remaining.saturating_sub(entry.size);
                    report.removed += 1;
                    report.freed_bytes += entry.size;
                }
                Err(e) => log::warn!(target: "imgtier::disk", "evict {} failed: {e}", entry.key),
            }
        }
        report.remaining_bytes = remaining;

        CacheMetrics::bump(&self.metrics.quota_sweeps);
        CacheMetrics::add(&self.metrics.quota_removed, report.removed as u64);
        crate::cache_trace!(
            "{{\"tier\":\"disk\",\"op\":\"quota_sweep\",\"target_bytes\":{},\"removed\":{},\"remaining_bytes\":{}}}",
            target_bytes,
            report.removed,
            report.remaining_bytes
        );
        report
    }

    fn reclaim_temp_files(&self, now: SystemTime) {
        let Ok(read) = fs::read_dir(&self.dir) else { return };
        for entry in read.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with('.') && name.ends_with(".tmp")) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .is_some_and(|age| age > STALE_TEMP_AGE);
            if stale {
                let _ = fsutil::remove_if_exists(&entry.path());
            }
        }
    }
}
