//! Configuration loading tests
//!
//! Tests that reader configuration loads correctly and provides expected
//! default values

use readify::config::Config;
use tempfile::tempdir;

#[test]
fn test_config_creates_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("readify.cfg");
    let config = Config::load_from(path.clone()).expect("Failed to load config");

    assert!(path.exists());
    assert!(config.path().to_str().unwrap().contains("readify.cfg"));

    // Default synthesis settings
    assert!(config.api_key().is_none());
    assert!(config.endpoint().starts_with("https://"));
    assert_eq!(config.model(), "gpt-4o-mini-tts");
    assert_eq!(config.voice(), "nova");
    assert_eq!(config.speed(), 1.0);

    // Default reader settings
    assert!(!config.show_paragraph_icons());
    assert_eq!(config.cache_size(), 50);
}

#[test]
fn test_config_persists_changes() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("readify.cfg");

    let mut config = Config::load_from(path.clone()).expect("Failed to load config");
    config.set("api", "key", "sk-integration-test");
    config.set("speech", "voice", "alloy");
    config.set("reader", "show_paragraph_icons", "true");
    config.set("cache", "size", "5");
    config.save().expect("Failed to save config");

    let reloaded = Config::load_from(path).expect("Failed to reload config");
    assert_eq!(reloaded.api_key().as_deref(), Some("sk-integration-test"));
    assert_eq!(reloaded.voice(), "alloy");
    assert!(reloaded.show_paragraph_icons());
    assert_eq!(reloaded.cache_size(), 5);
}

#[test]
fn test_config_tolerates_garbage_values() {
    let dir = tempdir().expect("tempdir");
    let mut config =
        Config::load_from(dir.path().join("readify.cfg")).expect("Failed to load config");

    config.set("speech", "speed", "not a number");
    config.set("cache", "size", "0");
    config.set("reader", "show_paragraph_icons", "maybe");

    assert_eq!(config.speed(), 1.0);
    assert_eq!(config.cache_size(), 50);
    assert!(!config.show_paragraph_icons());
}
