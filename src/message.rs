//! Cross-context message protocol
//!
//! The page context and the background context only ever talk through these
//! JSON-shaped actions. Field names and action tags follow the wire format
//! (`startTTS`, `playAudio`, ...) so a serialized message is exactly what
//! crosses the boundary.

use serde::{Deserialize, Serialize};

/// Opaque identifier of a speakable text unit, stable for the unit's lifetime
pub type UnitId = String;

/// Lifecycle events reported by the playback controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioLifecycle {
    #[serde(rename = "audioStarted")]
    Started,
    #[serde(rename = "audioEnded")]
    Ended,
    #[serde(rename = "audioError")]
    Error,
}

/// Per-unit state updates fanned out by the dispatcher
///
/// These are wire states; the page maps them onto its visual state registry
/// (e.g. `Stopped` becomes `played` or `idle` depending on history).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconUpdate {
    Loading,
    Playing,
    Ended,
    Stopped,
    Error,
}

/// Requests handled by the background context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum BackgroundAction {
    #[serde(rename = "startTTS", rename_all = "camelCase")]
    StartTts {
        text: String,
        api_key: String,
        speed: f32,
        voice: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paragraph_ids: Option<Vec<UnitId>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_paragraph_id: Option<UnitId>,
    },
    #[serde(rename = "stopTTS")]
    StopTts,
    #[serde(rename = "audioEvent", rename_all = "camelCase")]
    AudioEvent {
        event: AudioLifecycle,
        paragraph_id: UnitId,
    },
    #[serde(rename = "getCacheStats")]
    GetCacheStats,
    #[serde(rename = "clearCache")]
    ClearCache,
    #[serde(rename = "cleanExpiredCache")]
    CleanExpiredCache,
}

/// Requests handled by the page context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum PageAction {
    #[serde(rename = "extractPageText")]
    ExtractPageText,
    #[serde(rename = "getSelectedText")]
    GetSelectedText,
    #[serde(rename = "readParagraph", rename_all = "camelCase")]
    ReadParagraph { paragraph_id: UnitId },
    #[serde(rename = "updateIconState", rename_all = "camelCase")]
    UpdateIconState {
        paragraph_id: UnitId,
        state: IconUpdate,
    },
    #[serde(rename = "toggleParagraphIcons")]
    ToggleParagraphIcons { show: bool },
    #[serde(rename = "playAudio", rename_all = "camelCase")]
    PlayAudio {
        /// Base64-encoded MP3 (no native binary channel across the boundary)
        audio_data: String,
        speed: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paragraph_id: Option<UnitId>,
        #[serde(default)]
        paragraph_ids: Vec<UnitId>,
    },
    #[serde(rename = "stopAudio", rename_all = "camelCase")]
    StopAudio {
        /// True when a new request is superseding this playback, false for
        /// an explicit user stop. A bare `stopAudio` reads as a user stop.
        #[serde(default)]
        superseded: bool,
    },
    #[serde(rename = "updatePlaybackSpeed")]
    UpdatePlaybackSpeed { speed: f32 },
}

/// Generic success/error reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Reply to `startTTS`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl TtsOutcome {
    pub fn ok(message: impl Into<String>, from_cache: bool) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            from_cache,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            from_cache: false,
        }
    }
}

/// Reply to `extractPageText` / `getSelectedText` / `readParagraph`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to `getCacheStats`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub entries: Vec<CacheEntryInfo>,
}

/// One cache entry in a stats report: key, text preview and creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub text: String,
    pub timestamp: u64,
}

/// Replies carried back over a response channel
#[derive(Debug, Clone)]
pub enum Response {
    Ack(Ack),
    Tts(TtsOutcome),
    Extract(ExtractResult),
    Cache(CacheStats),
    /// Diagnostic: current unit visual states (id, state name)
    States(Vec<(UnitId, String)>),
    /// Diagnostic: scanned units (id, kind name, codepoint count)
    Units(Vec<(UnitId, String, usize)>),
}

/// Reply channel used by request envelopes
pub type ReplySender = crossbeam::channel::Sender<Response>;
