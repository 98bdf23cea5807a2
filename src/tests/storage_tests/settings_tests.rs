// Settings Tests - Testing Settings load, save and clamping

use crate::storage::{settings::MIN_POLL_INTERVAL_MS, Settings};
use std::time::Duration;
use tempfile::NamedTempFile;

// Settings Tests

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.api_base_url, "http://127.0.0.1:8000");
    assert_eq!(settings.message_poll_interval_ms, 5_000);
    assert_eq!(settings.conversation_poll_interval_ms, 15_000);
    assert!(settings.enable_notifications);
    assert_eq!(settings.preview_max_chars, 120);
    assert_eq!(settings.deep_link_retry_attempts, 5);
    assert_eq!(settings.deep_link_retry_delay_ms, 500);
    assert_eq!(settings.request_timeout_ms, 10_000);
}

#[test]
fn test_settings_durations() {
    let settings = Settings::default();

    assert_eq!(settings.message_poll_interval(), Duration::from_secs(5));
    assert_eq!(settings.conversation_poll_interval(), Duration::from_secs(15));
    assert_eq!(settings.deep_link_retry_delay(), Duration::from_millis(500));
    assert_eq!(settings.request_timeout(), Duration::from_secs(10));
}

#[test]
fn test_settings_save_and_load() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp_file.path();

    let settings = Settings {
        api_base_url: "https://tasks.example.com".to_string(),
        enable_notifications: false,
        ..Settings::default()
    };
    settings.save(path).expect("Failed to save");

    let loaded = Settings::load(path).expect("Failed to load");
    assert_eq!(loaded, settings);
}

#[test]
fn test_settings_load_nonexistent() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("missing.json");

    let settings = Settings::load(&path).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_settings_load_empty_file() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");

    let settings = Settings::load(temp_file.path()).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_settings_load_partial_file_uses_defaults() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(temp_file.path(), r#"{"message_poll_interval_ms": 2000}"#)
        .expect("Failed to write");

    let settings = Settings::load(temp_file.path()).expect("Failed to load");
    assert_eq!(settings.message_poll_interval_ms, 2_000);
    assert_eq!(settings.conversation_poll_interval_ms, 15_000);
}

#[test]
fn test_settings_load_clamps_zero_interval() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(
        temp_file.path(),
        r#"{"message_poll_interval_ms": 0, "conversation_poll_interval_ms": 5}"#,
    )
    .expect("Failed to write");

    let settings = Settings::load(temp_file.path()).expect("Failed to load");
    assert_eq!(settings.message_poll_interval_ms, MIN_POLL_INTERVAL_MS);
    assert_eq!(settings.conversation_poll_interval_ms, MIN_POLL_INTERVAL_MS);
}

#[test]
fn test_settings_load_malformed_file() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(temp_file.path(), "{not json").expect("Failed to write");

    assert!(Settings::load(temp_file.path()).is_err());
}
