//! Configuration management

use crate::{ReadifyError, Result};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Default remote synthesis endpoint (OpenAI-compatible)
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";
/// Default synthesis model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";
/// Default voice
pub const DEFAULT_VOICE: &str = "nova";
/// Default audio cache capacity
pub const DEFAULT_CACHE_SIZE: usize = 50;

/// Application configuration for the reader
///
/// Manages persistent settings: API credentials, speech parameters and
/// reader behavior. Stored as an INI file at ~/.readify.cfg.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.readify.cfg)
    path: PathBuf,
}

impl Config {
    /// Load configuration from disk or create default
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from an explicit path (used by tests)
    pub fn load_from(path: PathBuf) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| ReadifyError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| ReadifyError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| ReadifyError::Config(format!("Failed to save config: {}", e)))
    }

    /// Get config file path (~/.readify.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".readify.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("api"))
            .set("key", "")
            .set("endpoint", DEFAULT_ENDPOINT)
            .set("model", DEFAULT_MODEL);

        ini.with_section(Some("speech"))
            .set("speed", "1.0")
            .set("voice", DEFAULT_VOICE);

        ini.with_section(Some("reader"))
            .set("show_paragraph_icons", "false");

        ini.with_section(Some("cache"))
            .set("size", &DEFAULT_CACHE_SIZE.to_string());

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    // Reader-specific configuration getters

    /// Bearer token for the remote synthesis API, if configured
    pub fn api_key(&self) -> Option<String> {
        let key = self.get_string("api", "key", "");
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Remote synthesis endpoint URL
    pub fn endpoint(&self) -> String {
        self.get_string("api", "endpoint", DEFAULT_ENDPOINT)
    }

    /// Remote synthesis model name
    pub fn model(&self) -> String {
        self.get_string("api", "model", DEFAULT_MODEL)
    }

    /// Playback speed multiplier (1.0 is normal)
    pub fn speed(&self) -> f32 {
        self.get_float("speech", "speed", 1.0)
    }

    /// Voice name sent to the synthesis API
    pub fn voice(&self) -> String {
        self.get_string("speech", "voice", DEFAULT_VOICE)
    }

    /// Should per-paragraph playback markers be tracked?
    pub fn show_paragraph_icons(&self) -> bool {
        self.get_bool("reader", "show_paragraph_icons", false)
    }

    /// Maximum number of cached audio clips
    pub fn cache_size(&self) -> usize {
        let size = self.get_int("cache", "size", DEFAULT_CACHE_SIZE as i64);
        if size <= 0 {
            DEFAULT_CACHE_SIZE
        } else {
            size as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("readify.cfg")).unwrap();
        (dir, config)
    }

    #[test]
    fn defaults_written_on_first_load() {
        let (_dir, config) = temp_config();
        assert!(config.path().exists());
        assert_eq!(config.speed(), 1.0);
        assert_eq!(config.voice(), "nova");
        assert!(!config.show_paragraph_icons());
        assert_eq!(config.cache_size(), 50);
        assert!(config.api_key().is_none());
    }

    #[test]
    fn set_and_save_round_trip() {
        let (dir, mut config) = temp_config();
        config.set("api", "key", "sk-test-1234");
        config.set("speech", "speed", "1.5");
        config.save().unwrap();

        let reloaded = Config::load_from(dir.path().join("readify.cfg")).unwrap();
        assert_eq!(reloaded.api_key().as_deref(), Some("sk-test-1234"));
        assert_eq!(reloaded.speed(), 1.5);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let (_dir, mut config) = temp_config();
        config.set("speech", "speed", "fast");
        config.set("cache", "size", "-3");
        assert_eq!(config.speed(), 1.0);
        assert_eq!(config.cache_size(), 50);
    }
}
