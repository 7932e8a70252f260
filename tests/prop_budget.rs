use imgtier::cache::budget::GIB;
use imgtier::cache::classify;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_budget_is_monotonic(a in 0u64..16 * GIB, b in 0u64..16 * GIB) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (x, y) = (classify(lo), classify(hi));
        prop_assert!(x.memory_bytes <= y.memory_bytes);
        prop_assert!(x.disk_bytes <= y.disk_bytes);
        prop_assert_eq!(x.max_memory_entries, 100);
        prop_assert!(x.memory_bytes < x.disk_bytes);
    }
}
