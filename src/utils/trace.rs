//! Cache trace events with a thread-local capture sink.
//!
//! Evictions and sweeps emit one JSON line each through `cache_trace!`. The line
//! goes to the `imgtier::trace` log target at TRACE level and, when a sink is
//! enabled on the current thread, into that sink so tests can assert on it
//! without installing a global logger.

use std::cell::RefCell;

thread_local! {
    static SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the thread-local sink on drop.
pub struct TraceSinkGuard;

impl Drop for TraceSinkGuard {
    fn drop(&mut self) {
        SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Start capturing trace lines emitted on this thread.
pub fn capture() -> TraceSinkGuard {
    SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    TraceSinkGuard
}

pub fn record(line: &str) {
    SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Take everything captured so far on this thread.
pub fn drain() -> Vec<String> {
    SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

#[macro_export]
macro_rules! cache_trace {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::trace::record(&__line);
        log::log!(target: "imgtier::trace", log::Level::Trace, "{}", __line);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_captures_only_while_enabled() {
        crate::cache_trace!("before");
        let guard = capture();
        crate::cache_trace!("{{\"op\":\"sweep\",\"removed\":{}}}", 3);
        let lines = drain();
        assert_eq!(lines, vec!["{\"op\":\"sweep\",\"removed\":3}".to_string()]);
        assert!(drain().is_empty());
        drop(guard);
        crate::cache_trace!("after");
        assert!(drain().is_empty());
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = capture();
        std::thread::spawn(|| crate::cache_trace!("child")).join().unwrap();
        assert!(drain().is_empty());
    }
}
