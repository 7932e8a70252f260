//! Capacity budgets chosen from the device memory class.

use serde::Serialize;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Entry-count limit for the memory tier, identical on every device class.
pub const DEFAULT_MAX_MEMORY_ENTRIES: u32 = 100;
/// Disk entries older than this are removed by the expiry sweep.
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
/// Used when the platform cannot report its physical memory.
pub const FALLBACK_PHYSICAL_MEMORY: u64 = 2 * GIB;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Low,
    Mid,
    High,
}

impl DeviceClass {
    #[must_use]
    pub const fn from_physical_memory(bytes: u64) -> Self {
        if bytes < 2 * GIB {
            DeviceClass::Low
        } else if bytes < 3 * GIB {
            DeviceClass::Mid
        } else {
            DeviceClass::High
        }
    }
}

/// Byte and count limits for both tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheBudget {
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub max_memory_entries: u32,
    pub max_age_secs: u64,
}

impl CacheBudget {
    #[must_use]
    pub const fn for_class(class: DeviceClass) -> Self {
        let (memory_mb, disk_mb) = match class {
            DeviceClass::Low => (30, 200),
            DeviceClass::Mid => (50, 300),
            DeviceClass::High => (100, 500),
        };
        Self {
            memory_bytes: memory_mb * MIB,
            disk_bytes: disk_mb * MIB,
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

/// Selects the budget for a device with `physical_memory_bytes` of RAM.
#[must_use]
pub const fn classify(physical_memory_bytes: u64) -> CacheBudget {
    CacheBudget::for_class(DeviceClass::from_physical_memory(physical_memory_bytes))
}

/// Reports total physical memory of the host.
pub trait MemoryProbe: Send + Sync {
    fn physical_memory_bytes(&self) -> u64;
}

/// Fixed answer, for hosts that already know their memory size and for tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn physical_memory_bytes(&self) -> u64 {
        self.0
    }
}

/// Queries the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProbe;

impl MemoryProbe for SystemProbe {
    fn physical_memory_bytes(&self) -> u64 {
        match query_physical_memory() {
            Some(bytes) if bytes > 0 => bytes,
            _ => {
                log::warn!(
                    target: "imgtier::budget",
                    "physical memory unavailable; assuming {} bytes",
                    FALLBACK_PHYSICAL_MEMORY
                );
                FALLBACK_PHYSICAL_MEMORY
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn query_physical_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total(&meminfo)
}

#[cfg(windows)]
fn query_physical_memory() -> Option<u64> {
    use winapi::um::sysinfoapi::{GlobalMemoryStatusEx, MEMORYSTATUSEX};
    // SAFETY: MEMORYSTATUSEX is plain data; dwLength must be set before the call.
    unsafe {
        let mut status: MEMORYSTATUSEX = std::mem::zeroed();
        status.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
        if GlobalMemoryStatusEx(&mut status) != 0 {
            Some(status.ullTotalPhys)
        } else {
            None
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
fn query_physical_memory() -> Option<u64> {
    None
}

/// Extracts `MemTotal` (reported in KiB) from `/proc/meminfo` text.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        let kib = rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok()?;
        kib.checked_mul(1024)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meminfo_total_is_parsed_in_bytes() {
        let text = "MemTotal:        3921456 kB\nMemFree:          123 kB\n";
        assert_eq!(parse_meminfo_total(text), Some(3_921_456 * 1024));
        assert_eq!(parse_meminfo_total("MemFree: 1 kB"), None);
    }

    #[test]
    fn class_boundaries_are_exclusive_upper() {
        assert_eq!(DeviceClass::from_physical_memory(2 * GIB - 1), DeviceClass::Low);
        assert_eq!(DeviceClass::from_physical_memory(2 * GIB), DeviceClass::Mid);
        assert_eq!(DeviceClass::from_physical_memory(3 * GIB), DeviceClass::High);
    }
}
