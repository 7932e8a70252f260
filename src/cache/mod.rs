pub mod budget;
pub mod config;
mod facade;
pub mod disk;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod pressure;

pub use budget::{classify, CacheBudget, DeviceClass, FixedProbe, MemoryProbe, SystemProbe};
pub use config::CacheConfig;
pub use facade::{CacheStatistics, ImageCache};
pub use disk::{DiskEntry, DiskTier, SweepReport};
pub use key::{derive_key, CacheKey};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use pressure::{MemoryWarning, PressureAction, PressureController, PressurePolicy, PressureState};
