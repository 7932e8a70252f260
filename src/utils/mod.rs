//! Utility modules: trace sink, fs helpers, numeric conversions.
pub mod fsutil;
pub mod num;
pub mod trace;
