//! Cache configuration: defaults, TOML files and environment overrides.

use crate::cache::budget::{CacheBudget, MIB};
use crate::cache::pressure::{PressurePolicy, DEFAULT_COOLDOWN, DEFAULT_ESCALATION_THRESHOLD};
use crate::errors::CacheError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_QUOTA_TARGET_RATIO: f64 = 0.8;
pub const DEFAULT_ENCODE_QUALITY: f32 = 0.8;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    /// Overrides for the classifier's budget; `None` keeps the device default.
    pub memory_bytes: Option<u64>,
    pub disk_bytes: Option<u64>,
    pub max_memory_entries: Option<u32>,
    pub max_age_secs: Option<u64>,
    /// Skip the device probe and classify as if the host had this much RAM.
    pub physical_memory_bytes: Option<u64>,
    pub pressure_cooldown_ms: u64,
    pub escalation_threshold: u32,
    /// Quota sweeps trim to `disk_bytes * quota_target_ratio`.
    pub quota_target_ratio: f64,
    /// Disk encoding quality on a 0..=1 scale.
    pub encode_quality: f32,
    pub expiry_sweep_on_open: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            memory_bytes: None,
            disk_bytes: None,
            max_memory_entries: None,
            max_age_secs: None,
            physical_memory_bytes: None,
            pressure_cooldown_ms: u64::try_from(DEFAULT_COOLDOWN.as_millis()).unwrap_or(60_000),
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            quota_target_ratio: DEFAULT_QUOTA_TARGET_RATIO,
            encode_quality: DEFAULT_ENCODE_QUALITY,
            expiry_sweep_on_open: true,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self { cache_dir: dir.as_ref().to_path_buf(), ..Self::default() }
    }

    /// Platform cache directory, e.g. `~/.cache/imgtier/images` on Linux.
    #[must_use]
    pub fn default_cache_dir() -> PathBuf {
        dirs_next::cache_dir()
            .map(|d| d.join("imgtier").join("images"))
            .unwrap_or_else(|| PathBuf::from("imgtier-cache"))
    }

    /// Applies the configured overrides on top of a classified budget.
    #[must_use]
    pub fn apply_overrides(&self, mut budget: CacheBudget) -> CacheBudget {
        if let Some(v) = self.memory_bytes {
            budget.memory_bytes = v;
        }
        if let Some(v) = self.disk_bytes {
            budget.disk_bytes = v;
        }
        if let Some(v) = self.max_memory_entries {
            budget.max_memory_entries = v;
        }
        if let Some(v) = self.max_age_secs {
            budget.max_age_secs = v;
        }
        budget
    }

    #[must_use]
    pub fn pressure_policy(&self) -> PressurePolicy {
        PressurePolicy {
            cooldown: Duration::from_millis(self.pressure_cooldown_ms),
            escalation_threshold: self.escalation_threshold,
        }
    }

    /// # Errors
    /// Returns an error for malformed TOML or out-of-range values.
    pub fn from_toml_str(s: &str) -> Result<Self, CacheError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }

    /// Overlay environment variables onto `self`:
    /// - `IMGTIER_CACHE_DIR`
    /// - `IMGTIER_MEMORY_MB`
    /// - `IMGTIER_DISK_MB`
    ///
    /// # Errors
    /// Returns an error if a numeric variable does not parse.
    pub fn apply_env(mut self) -> Result<Self, CacheError> {
        self.apply_vars(|name| std::env::var(name).ok())?;
        Ok(self)
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), CacheError> {
        if let Some(dir) = get("IMGTIER_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("IMGTIER_MEMORY_MB") {
            self.memory_bytes = Some(parse_mb("IMGTIER_MEMORY_MB", &v)?);
        }
        if let Some(v) = get("IMGTIER_DISK_MB") {
            self.disk_bytes = Some(parse_mb("IMGTIER_DISK_MB", &v)?);
        }
        Ok(())
    }

    /// Resolve a configuration. Precedence: environment > first config file
    /// found > defaults. Files are searched at `explicit`, `$IMGTIER_CONFIG`,
    /// `~/.config/imgtier.toml`, then `./imgtier.toml`.
    ///
    /// # Errors
    /// Returns an error if a found file is malformed or an env value is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CacheError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(p) = explicit {
            candidates.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("IMGTIER_CONFIG") {
            candidates.push(PathBuf::from(p));
        }
        if let Some(cfg_dir) = dirs_next::config_dir() {
            candidates.push(cfg_dir.join("imgtier.toml"));
        }
        if let Ok(cur) = std::env::current_dir() {
            candidates.push(cur.join("imgtier.toml"));
        }

        let base = match candidates.iter().find(|p| p.is_file()) {
            Some(p) => {
                log::info!(target: "imgtier::config", "loading config from {}", p.display());
                Self::from_file(p)?
            }
            None => Self::default(),
        };
        base.apply_env()
    }

    /// # Errors
    /// Returns an error when a ratio or quality lies outside `0..=1`.
    pub fn validate(&self) -> Result<(), CacheError> {
        if !(0.0..=1.0).contains(&self.quota_target_ratio) {
            return Err(CacheError::Config(format!(
                "quota_target_ratio must be within 0..=1, got {}",
                self.quota_target_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.encode_quality) {
            return Err(CacheError::Config(format!(
                "encode_quality must be within 0..=1, got {}",
                self.encode_quality
            )));
        }
        Ok(())
    }
}

fn parse_mb(name: &str, value: &str) -> Result<u64, CacheError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|mb| mb.checked_mul(MIB))
        .ok_or_else(|| CacheError::Config(format!("{name}: invalid megabyte value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overlay_parses_megabytes() {
        let vars: HashMap<&str, &str> =
            [("IMGTIER_MEMORY_MB", "12"), ("IMGTIER_CACHE_DIR", "/tmp/x")].into_iter().collect();
        let mut cfg = CacheConfig::default();
        cfg.apply_vars(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.memory_bytes, Some(12 * MIB));
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/x"));
        assert_eq!(cfg.disk_bytes, None);
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let mut cfg = CacheConfig::default();
        let err = cfg.apply_vars(|k| (k == "IMGTIER_DISK_MB").then(|| "lots".to_string()));
        assert!(matches!(err, Err(CacheError::Config(_))));
    }
}
