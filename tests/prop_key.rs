use imgtier::{CacheKey, derive_key};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_key_is_stable_lowercase_hex(s in ".*") {
        let a = derive_key(&s);
        let hex = a.to_hex();
        prop_assert_eq!(hex.len(), 64);
        prop_assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        prop_assert_eq!(a, derive_key(&s.clone()));
        prop_assert_eq!(hex.parse::<CacheKey>().unwrap(), a);
    }

    #[test]
    fn prop_distinct_identifiers_distinct_files(a in "[a-z0-9/:.]{1,40}", b in "[a-z0-9/:.]{1,40}") {
        prop_assume!(a != b);
        prop_assert_ne!(derive_key(&a).to_hex(), derive_key(&b).to_hex());
    }
}
