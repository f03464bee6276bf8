//! Error types for Readify

use std::io;
use thiserror::Error;

/// Main error type for Readify
#[derive(Error, Debug)]
pub enum ReadifyError {
    /// No API key configured; synthesis cannot proceed until the user sets one
    #[error("No API key configured")]
    MissingCredential,

    /// Empty or otherwise unusable request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote synthesis API failure. Status 0 means the request never
    /// reached the server (connect/transport error).
    #[error("TTS API error: {status} - {message}")]
    Remote { status: u16, message: String },

    /// A unit or session target no longer exists (page navigated away)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Host audio playback failure
    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Readify operations
pub type Result<T> = std::result::Result<T, ReadifyError>;

impl From<String> for ReadifyError {
    fn from(s: String) -> Self {
        ReadifyError::Other(s)
    }
}

impl From<&str> for ReadifyError {
    fn from(s: &str) -> Self {
        ReadifyError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for ReadifyError {
    fn from(e: serde_json::Error) -> Self {
        ReadifyError::InvalidInput(format!("JSON error: {}", e))
    }
}
