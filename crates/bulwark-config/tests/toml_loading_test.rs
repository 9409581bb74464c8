//! Config loading tests
//!
//! Partial documents fall back to defaults, every supported format loads
//! from disk, and invalid values are rejected at load time.

use bulwark_config::{ConfigError, ConfigLoader, LogFormat, RecoveryStrategy, ResilienceConfig};
use std::io::Write;

#[test]
fn test_empty_toml_yields_defaults() {
    let config = ConfigLoader::from_toml_str("").expect("empty document should load");
    assert_eq!(config, ResilienceConfig::default());
    assert_eq!(config.breaker.failure_threshold, 3);
    assert_eq!(config.recovery.max_concurrent_recoveries, 2);
    assert_eq!(config.metrics.max_history, 1000);
}

#[test]
fn test_partial_toml_overrides_only_given_fields() {
    let toml = r#"
        [breaker]
        failure_threshold = 5

        [recovery]
        check_interval_seconds = 15

        [recovery.default_policy]
        strategy = "scheduled"
        base_delay_seconds = 10

        [logging]
        format = "json"
    "#;

    let config = ConfigLoader::from_toml_str(toml).expect("partial document should load");
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.recovery_timeout_seconds, 60);
    assert_eq!(config.recovery.check_interval_seconds, 15);
    assert_eq!(config.recovery.default_policy.strategy, RecoveryStrategy::Scheduled);
    assert_eq!(config.recovery.default_policy.base_delay_seconds, 10);
    assert_eq!(config.recovery.default_policy.max_delay_seconds, 900);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_toml_round_trip() {
    let mut config = ResilienceConfig::default();
    config.deadline.retry.max_retries = 7;
    config.recovery.default_policy.strategy = RecoveryStrategy::Manual;

    let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize config");
    let parsed = ConfigLoader::from_toml_str(&toml_str).expect("Failed to parse config");
    assert_eq!(parsed, config);
}

#[test]
fn test_invalid_values_rejected() {
    let toml = r#"
        [deadline.retry]
        base_delay_ms = 5000
        max_delay_ms = 100
    "#;

    let result = ConfigLoader::from_toml_str(toml);
    assert!(
        matches!(result, Err(ConfigError::Validation(_))),
        "expected validation error, got: {:?}",
        result
    );
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let result = ConfigLoader::from_toml_str("[breaker\nfailure_threshold = ");
    assert!(matches!(result, Err(ConfigError::Parse { format: "toml", .. })));
}

#[tokio::test]
async fn test_load_json_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("create temp file");
    write!(
        file,
        r#"{{"breaker": {{"failure_threshold": 4}}, "metrics": {{"max_history": 50}}}}"#
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(file.path()).await.unwrap();
    assert_eq!(config.breaker.failure_threshold, 4);
    assert_eq!(config.metrics.max_history, 50);
}

#[tokio::test]
async fn test_load_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bulwark.toml");
    std::fs::write(&path, "[recovery]\nmax_concurrent_recoveries = 4\n").unwrap();

    let config = ConfigLoader::load_from_file(&path).await.unwrap();
    assert_eq!(config.recovery.max_concurrent_recoveries, 4);
}

#[tokio::test]
async fn test_unknown_extension_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bulwark.ini");
    std::fs::write(&path, "x=1").unwrap();

    let result = ConfigLoader::load_from_file(&path).await;
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ref ext)) if ext == "ini"));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigLoader::load_from_file(dir.path().join("absent.toml")).await;
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
