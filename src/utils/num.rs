//! Numeric utilities: centralized integer/float conversions.
//!
//! Byte counts cross between `usize` (buffers), `u64` (budgets, file sizes) and
//! `f64` (ratios, statistics). Keep the lossy edges here so call sites stay searchable.

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn f64_to_u64_saturating(v: f64) -> u64 {
    if !v.is_finite() || v <= 0.0 {
        0
    } else if v >= u64::MAX as f64 {
        u64::MAX
    } else {
        v as u64
    }
}

/// `total * ratio`, clamped to `0..=total`.
#[inline]
#[must_use]
pub fn scale_bytes(total: u64, ratio: f64) -> u64 {
    f64_to_u64_saturating(total as f64 * ratio.clamp(0.0, 1.0)).min(total)
}

#[inline]
#[must_use]
pub fn bytes_to_gib(v: u64) -> f64 {
    v as f64 / (1024.0 * 1024.0 * 1024.0)
}
