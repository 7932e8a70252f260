use imgtier::cache::budget::{GIB, MIB};
use imgtier::cache::classify;
use imgtier::{CacheConfig, CacheError};
use std::time::Duration;

#[test]
fn toml_fields_override_defaults() {
    let cfg = CacheConfig::from_toml_str(
        r#"
        cache_dir = "/var/cache/app-images"
        disk_bytes = 1048576
        pressure_cooldown_ms = 5000
        quota_target_ratio = 0.5
        "#,
    )
    .unwrap();
    assert_eq!(cfg.cache_dir, std::path::PathBuf::from("/var/cache/app-images"));
    assert_eq!(cfg.disk_bytes, Some(MIB));
    assert_eq!(cfg.memory_bytes, None);
    assert_eq!(cfg.escalation_threshold, 2);
    assert_eq!(cfg.pressure_policy().cooldown, Duration::from_secs(5));
    assert!(cfg.expiry_sweep_on_open);

    let budget = cfg.apply_overrides(classify(GIB));
    assert_eq!(budget.disk_bytes, MIB);
    assert_eq!(budget.memory_bytes, 30 * MIB);
}

#[test]
fn defaults_match_documented_values() {
    let cfg = CacheConfig::default();
    assert_eq!(cfg.pressure_cooldown_ms, 60_000);
    assert_eq!(cfg.escalation_threshold, 2);
    assert!((cfg.quota_target_ratio - 0.8).abs() < f64::EPSILON);
    assert!((cfg.encode_quality - 0.8).abs() < f32::EPSILON);
    assert!(cfg.cache_dir.ends_with("images"));
}

#[test]
fn malformed_and_out_of_range_values_are_errors() {
    assert!(matches!(CacheConfig::from_toml_str("disk_bytes = \"big\""), Err(CacheError::Toml(_))));
    assert!(matches!(
        CacheConfig::from_toml_str("encode_quality = 3.0"),
        Err(CacheError::Config(_))
    ));
}

#[test]
fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("imgtier.toml");
    std::fs::write(&path, "max_memory_entries = 12\n").unwrap();
    let cfg = CacheConfig::from_file(&path).unwrap();
    assert_eq!(cfg.max_memory_entries, Some(12));
    assert!(CacheConfig::from_file(dir.path().join("missing.toml")).is_err());
}
