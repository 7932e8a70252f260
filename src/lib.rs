//! Two-tier (memory + disk) image cache with device-aware budgets, memory
//! pressure handling and a retrying per-call-site loader.

pub mod cache;
pub mod codec;
pub mod errors;
pub mod loader;
pub mod logger;
pub mod utils;

pub use crate::cache::{
    CacheBudget, CacheConfig, CacheKey, CacheStatistics, DeviceClass, ImageCache, MemoryWarning,
    PressureAction, PressureState, derive_key,
};
pub use crate::codec::{Image, ImageCodec, JpegCodec};
pub use crate::errors::CacheError;
pub use crate::loader::{Fetcher, ImageLoader, LoadFailure, LoadState, LoaderOptions};
