use imgtier::cache::{CacheMetrics, MemoryTier};
use imgtier::derive_key;
use imgtier::utils::trace;
use std::sync::Arc;

mod common;

fn tier(max_bytes: u64, max_entries: u32) -> (MemoryTier, Arc<CacheMetrics>) {
    let metrics = Arc::new(CacheMetrics::default());
    (MemoryTier::new(max_bytes, max_entries, metrics.clone()), metrics)
}

#[test]
fn entry_limit_evicts_least_recently_used() {
    let (mem, metrics) = tier(1_000_000, 3);
    let keys: Vec<_> = (0..3).map(|i| derive_key(&format!("k{i}"))).collect();
    for k in &keys {
        assert!(mem.put(*k, common::solid(2, 2, 0), 12));
    }
    // Touch k0 so k1 becomes the oldest.
    assert!(mem.get(&keys[0]).is_some());

    let k3 = derive_key("k3");
    assert!(mem.put(k3, common::solid(2, 2, 0), 12));
    assert_eq!(mem.len(), 3);
    assert!(!mem.contains(&keys[1]));
    assert!(mem.contains(&keys[0]) && mem.contains(&keys[2]) && mem.contains(&k3));
    assert_eq!(metrics.snapshot().memory_evictions, 1);
}

#[test]
fn byte_limit_evicts_until_new_entry_fits() {
    let (mem, _) = tier(100, 100);
    let a = derive_key("a");
    let b = derive_key("b");
    let c = derive_key("c");
    mem.put(a, common::solid(1, 1, 0), 40);
    mem.put(b, common::solid(1, 1, 0), 40);
    assert_eq!(mem.used_bytes(), 80);

    let _g = trace::capture();
    mem.put(c, common::solid(1, 1, 0), 50);
    assert_eq!(mem.keys_lru_first(), vec![b, c]);
    assert_eq!(mem.used_bytes(), 90);
    let lines = trace::drain();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("\"op\":\"evict\"") && lines[0].contains("\"freed_bytes\":40"));
}

#[test]
fn oversized_entry_is_rejected_without_flushing_tier() {
    let (mem, _) = tier(100, 10);
    let a = derive_key("a");
    mem.put(a, common::solid(1, 1, 0), 60);
    assert!(!mem.put(derive_key("huge"), common::solid(1, 1, 0), 101));
    assert!(mem.contains(&a));
    assert_eq!(mem.used_bytes(), 60);
}

#[test]
fn overwrite_replaces_cost() {
    let (mem, _) = tier(100, 10);
    let a = derive_key("a");
    mem.put(a, common::solid(1, 1, 0), 60);
    mem.put(a, common::solid(1, 1, 9), 30);
    assert_eq!(mem.len(), 1);
    assert_eq!(mem.used_bytes(), 30);
    assert_eq!(mem.peek(&a), Some(common::solid(1, 1, 9)));
}

#[test]
fn remove_and_remove_all() {
    let (mem, _) = tier(1000, 10);
    let a = derive_key("a");
    mem.put(a, common::solid(1, 1, 0), 10);
    mem.put(derive_key("b"), common::solid(1, 1, 0), 10);
    assert!(mem.remove(&a).is_some());
    assert!(mem.remove(&a).is_none());
    assert_eq!(mem.remove_all(), 1);
    assert!(mem.is_empty());
    assert_eq!(mem.used_bytes(), 0);
}

#[test]
fn concurrent_puts_respect_limits() {
    let (mem, _) = tier(10_000, 50);
    let mem = Arc::new(mem);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let mem = mem.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    mem.put(derive_key(&format!("{t}-{i}")), common::solid(1, 1, 0), 150);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(mem.len() <= 50);
    assert!(mem.used_bytes() <= 10_000);
    assert_eq!(mem.used_bytes(), mem.len() as u64 * 150);
}
