//! Remote speech synthesis client
//!
//! Thin client for an OpenAI-compatible `/audio/speech` endpoint: JSON
//! request in, MP3 bytes out. The dispatcher talks to it through the
//! [`TtsClient`] trait so tests can substitute a fake.

use crate::{ReadifyError, Result};
use log::{debug, warn};
use serde_json::json;
use std::io::Read;

/// Synthesized audio larger than this is suspicious; refuse to buffer more
const MAX_AUDIO_BYTES: u64 = 32 * 1024 * 1024;

/// One synthesis request. Speed is applied at playback time, not here, so
/// the same audio serves any rate.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub api_key: String,
}

/// Remote synthesis backend
pub trait TtsClient: Send + Sync {
    /// Synthesize the request into MP3 bytes
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}

/// Client for the OpenAI speech API (and compatible endpoints)
pub struct OpenAiTts {
    endpoint: String,
    model: String,
}

impl OpenAiTts {
    pub fn new(endpoint: String, model: String) -> Self {
        Self { endpoint, model }
    }
}

impl TtsClient for OpenAiTts {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        debug!(
            "Synthesizing {} chars with voice {}",
            request.text.chars().count(),
            request.voice
        );

        // No deadline here: a long chunk takes as long as it takes, and a
        // superseded result is discarded by generation anyway
        let response = ureq::post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", request.api_key))
            .send_json(json!({
                "model": self.model,
                "voice": request.voice,
                "input": request.text,
                "response_format": "mp3",
            }));

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(ReadifyError::Remote {
                    status,
                    message: error_message(response),
                });
            }
            Err(e) => {
                // Never reached the server
                return Err(ReadifyError::Remote {
                    status: 0,
                    message: e.to_string(),
                });
            }
        };

        let mut audio = Vec::new();
        response
            .into_reader()
            .take(MAX_AUDIO_BYTES)
            .read_to_end(&mut audio)?;

        if audio.is_empty() {
            return Err(ReadifyError::Remote {
                status: 0,
                message: "Empty audio response".to_string(),
            });
        }

        debug!("Received {} bytes of audio", audio.len());
        Ok(audio)
    }
}

/// Pull the human-readable message out of an API error body
fn error_message(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    match response.into_json::<serde_json::Value>() {
        Ok(body) => body
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or(status_text),
        Err(e) => {
            warn!("Unreadable API error body: {}", e);
            status_text
        }
    }
}
