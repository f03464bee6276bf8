//! Dispatcher behavior tests
//!
//! Drives the background context through its message channel with a fake
//! synthesis client, checking single-flight semantics, cache hits,
//! supersession, and the icon update fan-out.

use crossbeam::channel::{unbounded, Receiver, Sender};
use readify::background::tts::{SynthesisRequest, TtsClient};
use readify::background::{BackgroundMessage, Dispatcher};
use readify::message::{
    AudioLifecycle, BackgroundAction, IconUpdate, PageAction, Response,
};
use readify::page::PageMessage;
use readify::ReadifyError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct FakeTts {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl FakeTts {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TtsClient for FakeTts {
    fn synthesize(&self, request: &SynthesisRequest) -> readify::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail {
            return Err(ReadifyError::Remote {
                status: 401,
                message: "Incorrect API key provided".to_string(),
            });
        }
        Ok(format!("MP3:{}", request.text).into_bytes())
    }
}

fn start_dispatcher(
    client: Arc<FakeTts>,
) -> (Sender<BackgroundMessage>, Receiver<PageMessage>) {
    let (bg_tx, bg_rx) = unbounded();
    let (page_tx, page_rx) = unbounded();
    let dispatcher = Dispatcher::new(10, client, page_tx, bg_tx.clone());
    thread::spawn(move || dispatcher.run(bg_rx));
    (bg_tx, page_rx)
}

fn start_tts(text: &str, ids: &[&str]) -> BackgroundAction {
    BackgroundAction::StartTts {
        text: text.to_string(),
        api_key: "sk-test".to_string(),
        speed: 1.0,
        voice: "nova".to_string(),
        paragraph_ids: Some(ids.iter().map(|s| s.to_string()).collect()),
        last_paragraph_id: ids.last().map(|s| s.to_string()),
    }
}

fn request(bg: &Sender<BackgroundMessage>, action: BackgroundAction) -> Response {
    let (tx, rx) = unbounded();
    bg.send(BackgroundMessage::Action(action, Some(tx)))
        .expect("dispatcher gone");
    rx.recv_timeout(Duration::from_secs(5)).expect("no reply")
}

/// Collect page-bound actions until the channel goes quiet
fn drain_page(page_rx: &Receiver<PageMessage>) -> Vec<PageAction> {
    let mut actions = Vec::new();
    while let Ok(msg) = page_rx.recv_timeout(Duration::from_millis(200)) {
        if let PageMessage::Action(action, _) = msg {
            actions.push(action);
        }
    }
    actions
}

#[test]
fn test_identical_requests_synthesize_once() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client.clone());

    let Response::Tts(first) = request(&bg, start_tts("hello world text", &["u1"])) else {
        panic!("expected TTS reply");
    };
    assert!(first.success);
    assert!(!first.from_cache);

    let Response::Tts(second) = request(&bg, start_tts("hello world text", &["u1"])) else {
        panic!("expected TTS reply");
    };
    assert!(second.success);
    assert!(second.from_cache);

    assert_eq!(client.calls(), 1);

    let plays = drain_page(&page_rx)
        .into_iter()
        .filter(|a| matches!(a, PageAction::PlayAudio { .. }))
        .count();
    assert_eq!(plays, 2);
}

#[test]
fn test_missing_credential_and_empty_text_fail_fast() {
    let client = Arc::new(FakeTts::new());
    let (bg, _page_rx) = start_dispatcher(client.clone());

    let action = BackgroundAction::StartTts {
        text: "some text to read".to_string(),
        api_key: String::new(),
        speed: 1.0,
        voice: "nova".to_string(),
        paragraph_ids: None,
        last_paragraph_id: None,
    };
    let Response::Tts(outcome) = request(&bg, action) else {
        panic!("expected TTS reply");
    };
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("API key"));

    let Response::Tts(outcome) = request(&bg, start_tts("   ", &["u1"])) else {
        panic!("expected TTS reply");
    };
    assert!(!outcome.success);

    assert_eq!(client.calls(), 0);
}

#[test]
fn test_remote_error_surfaces_status_and_message() {
    let client = Arc::new(FakeTts::failing());
    let (bg, page_rx) = start_dispatcher(client);

    let Response::Tts(outcome) = request(&bg, start_tts("failing request text", &["u1"])) else {
        panic!("expected TTS reply");
    };
    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("401"));
    assert!(error.contains("Incorrect API key"));

    // The failed unit gets an error marker
    let errors = drain_page(&page_rx)
        .into_iter()
        .filter(|a| {
            matches!(
                a,
                PageAction::UpdateIconState {
                    state: IconUpdate::Error,
                    ..
                }
            )
        })
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn test_stop_with_nothing_active_is_a_noop() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client);

    let Response::Ack(ack) = request(&bg, BackgroundAction::StopTts) else {
        panic!("expected ack");
    };
    assert!(ack.success);
    assert!(drain_page(&page_rx).is_empty());
}

#[test]
fn test_stop_halts_playback_and_reverts_icons() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client);

    let Response::Tts(outcome) = request(&bg, start_tts("text being spoken", &["u1", "u2"])) else {
        panic!("expected TTS reply");
    };
    assert!(outcome.success);
    drain_page(&page_rx);

    let Response::Ack(ack) = request(&bg, BackgroundAction::StopTts) else {
        panic!("expected ack");
    };
    assert!(ack.success);

    let actions = drain_page(&page_rx);
    // A user stop is not tagged as a supersession
    assert!(actions
        .iter()
        .any(|a| matches!(a, PageAction::StopAudio { superseded: false })));
    let stopped = actions
        .iter()
        .filter(|a| {
            matches!(
                a,
                PageAction::UpdateIconState {
                    state: IconUpdate::Stopped,
                    ..
                }
            )
        })
        .count();
    assert_eq!(stopped, 2);
}

#[test]
fn test_stop_before_a_new_request_is_tagged_as_supersession() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client);

    let Response::Tts(first) = request(&bg, start_tts("first chunk text", &["u1"])) else {
        panic!("expected TTS reply");
    };
    assert!(first.success);
    drain_page(&page_rx);

    let Response::Tts(second) = request(&bg, start_tts("second chunk text", &["u2"])) else {
        panic!("expected TTS reply");
    };
    assert!(second.success);

    // The stop that clears the first session is marked superseded so the
    // page keeps the reading state of the request that caused it
    let actions = drain_page(&page_rx);
    assert!(actions
        .iter()
        .any(|a| matches!(a, PageAction::StopAudio { superseded: true })));
    assert!(actions
        .iter()
        .any(|a| matches!(a, PageAction::PlayAudio { .. })));
}

#[test]
fn test_new_request_supersedes_pending_synthesis() {
    let client = Arc::new(FakeTts::slow(Duration::from_millis(200)));
    let (bg, page_rx) = start_dispatcher(client.clone());

    // First request; do not wait for its reply
    let (first_tx, first_rx) = unbounded();
    bg.send(BackgroundMessage::Action(
        start_tts("first request text", &["u1"]),
        Some(first_tx),
    ))
    .expect("dispatcher gone");
    thread::sleep(Duration::from_millis(50));

    // Second request supersedes it while its synthesis is in flight
    let Response::Tts(second) = request(&bg, start_tts("second request text", &["u2"])) else {
        panic!("expected TTS reply");
    };
    assert!(second.success);

    // The superseded request was told it stopped
    let Response::Tts(first) = first_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no reply")
    else {
        panic!("expected TTS reply");
    };
    assert!(!first.success);

    // Both synthesized, but only the second result ever played
    assert_eq!(client.calls(), 2);
    let plays: Vec<String> = drain_page(&page_rx)
        .into_iter()
        .filter_map(|a| match a {
            PageAction::PlayAudio { paragraph_id, .. } => Some(paragraph_id.unwrap_or_default()),
            _ => None,
        })
        .collect();
    assert_eq!(plays, vec!["u2".to_string()]);
}

#[test]
fn test_audio_events_fan_out_to_session_units() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client);

    let Response::Tts(outcome) = request(&bg, start_tts("chunk of two units", &["u1", "u2"]))
    else {
        panic!("expected TTS reply");
    };
    assert!(outcome.success);
    drain_page(&page_rx);

    let started = BackgroundAction::AudioEvent {
        event: AudioLifecycle::Started,
        paragraph_id: "u2".to_string(),
    };
    request(&bg, started);
    let playing = drain_page(&page_rx)
        .into_iter()
        .filter(|a| {
            matches!(
                a,
                PageAction::UpdateIconState {
                    state: IconUpdate::Playing,
                    ..
                }
            )
        })
        .count();
    assert_eq!(playing, 2);

    let ended = BackgroundAction::AudioEvent {
        event: AudioLifecycle::Ended,
        paragraph_id: "u2".to_string(),
    };
    request(&bg, ended);
    let ended_updates = drain_page(&page_rx)
        .into_iter()
        .filter(|a| {
            matches!(
                a,
                PageAction::UpdateIconState {
                    state: IconUpdate::Ended,
                    ..
                }
            )
        })
        .count();
    assert_eq!(ended_updates, 2);
}

#[test]
fn test_cache_management_actions() {
    let client = Arc::new(FakeTts::new());
    let (bg, page_rx) = start_dispatcher(client);

    request(&bg, start_tts("cached paragraph text", &["u1"]));
    drain_page(&page_rx);

    let Response::Cache(stats) = request(&bg, BackgroundAction::GetCacheStats) else {
        panic!("expected cache stats");
    };
    assert_eq!(stats.size, 1);
    assert_eq!(stats.entries[0].text, "cached paragraph text");

    let Response::Ack(ack) = request(&bg, BackgroundAction::CleanExpiredCache) else {
        panic!("expected ack");
    };
    assert!(ack.success);

    let Response::Ack(ack) = request(&bg, BackgroundAction::ClearCache) else {
        panic!("expected ack");
    };
    assert!(ack.success);

    let Response::Cache(stats) = request(&bg, BackgroundAction::GetCacheStats) else {
        panic!("expected cache stats");
    };
    assert_eq!(stats.size, 0);
}
