//! Readify - page-to-speech reader
//!
//! Extracts readable text from HTML pages and speaks it through a cloud
//! synthesis API. Split into a page context (scanning, markers, playback)
//! and a background context (cache, synthesis dispatch) that communicate
//! over a JSON-shaped message protocol.

pub mod background;
pub mod config;
pub mod error;
pub mod message;
pub mod page;
pub mod runtime;

pub use error::{ReadifyError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "readify";
