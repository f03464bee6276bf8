//! Background context
//!
//! Owns the synthesis pipeline: the audio cache, the remote TTS client, and
//! the single-flight dispatcher that decides what is currently being spoken.
//! At most one synthesis is in flight and at most one clip plays at a time;
//! a new `startTTS` supersedes whatever came before it. Superseded network
//! work is not aborted, its result is simply discarded when it lands with a
//! stale generation number.

pub mod cache;
pub mod tts;

use crate::message::{
    Ack, AudioLifecycle, BackgroundAction, IconUpdate, PageAction, ReplySender, Response,
    TtsOutcome, UnitId,
};
use crate::page::PageMessage;
use crate::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use self::cache::AudioCache;
use self::tts::{SynthesisRequest, TtsClient};
use std::sync::Arc;
use std::thread;

/// Requests handled by the background event loop
pub enum BackgroundMessage {
    /// A protocol action, optionally expecting a reply
    Action(BackgroundAction, Option<ReplySender>),
    /// A synthesis worker finished
    SynthDone {
        generation: u64,
        result: Result<Vec<u8>>,
    },
    Shutdown,
}

/// Synthesis request waiting on its worker
struct PendingSynthesis {
    text: String,
    voice: String,
    speed: f32,
    unit_ids: Vec<UnitId>,
    repr_unit: Option<UnitId>,
    reply: Option<ReplySender>,
}

/// Units attached to the clip currently loading or playing
struct ActiveSession {
    unit_ids: Vec<UnitId>,
}

/// Single-flight synthesis and playback dispatcher
pub struct Dispatcher {
    cache: AudioCache,
    client: Arc<dyn TtsClient>,
    page: Sender<PageMessage>,
    /// Sender workers use to post their results back into the loop
    self_tx: Sender<BackgroundMessage>,

    /// Bumped on every new request and every stop; results stamped with an
    /// older generation are stale
    generation: u64,
    pending: Option<PendingSynthesis>,
    session: Option<ActiveSession>,
}

impl Dispatcher {
    pub fn new(
        cache_size: usize,
        client: Arc<dyn TtsClient>,
        page: Sender<PageMessage>,
        self_tx: Sender<BackgroundMessage>,
    ) -> Self {
        Self {
            cache: AudioCache::new(cache_size),
            client,
            page,
            self_tx,
            generation: 0,
            pending: None,
            session: None,
        }
    }

    /// Run the event loop until shutdown or channel disconnect
    pub fn run(mut self, requests: Receiver<BackgroundMessage>) {
        info!("Background context started");
        for msg in requests {
            match msg {
                BackgroundMessage::Action(action, reply) => self.handle(action, reply),
                BackgroundMessage::SynthDone { generation, result } => {
                    self.on_synth_done(generation, result)
                }
                BackgroundMessage::Shutdown => break,
            }
        }
        info!("Background context stopped");
    }

    fn handle(&mut self, action: BackgroundAction, reply: Option<ReplySender>) {
        match action {
            BackgroundAction::StartTts {
                text,
                api_key,
                speed,
                voice,
                paragraph_ids,
                last_paragraph_id,
            } => self.start_tts(
                text,
                api_key,
                speed,
                voice,
                paragraph_ids.unwrap_or_default(),
                last_paragraph_id,
                reply,
            ),
            BackgroundAction::StopTts => {
                self.stop_all(false);
                send_reply(reply, Response::Ack(Ack::ok()));
            }
            BackgroundAction::AudioEvent {
                event,
                paragraph_id,
            } => {
                self.on_audio_event(event, paragraph_id);
                send_reply(reply, Response::Ack(Ack::ok()));
            }
            BackgroundAction::GetCacheStats => {
                send_reply(reply, Response::Cache(self.cache.stats()));
            }
            BackgroundAction::ClearCache => {
                self.cache.clear();
                send_reply(reply, Response::Ack(Ack::ok_with("Cache cleared")));
            }
            BackgroundAction::CleanExpiredCache => {
                let removed = self.cache.clean_expired();
                send_reply(
                    reply,
                    Response::Ack(Ack::ok_with(format!(
                        "Removed {} expired entries",
                        removed
                    ))),
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn start_tts(
        &mut self,
        text: String,
        api_key: String,
        speed: f32,
        voice: String,
        unit_ids: Vec<UnitId>,
        repr_unit: Option<UnitId>,
        reply: Option<ReplySender>,
    ) {
        if text.trim().is_empty() {
            send_reply(reply, Response::Tts(TtsOutcome::err("No text provided")));
            return;
        }
        if api_key.is_empty() {
            send_reply(
                reply,
                Response::Tts(TtsOutcome::err("No API key configured")),
            );
            return;
        }

        // Whatever was loading or playing is superseded
        self.stop_all(true);

        if let Some(audio) = self.cache.get(&text, &voice, speed) {
            info!("Serving {} bytes from cache", audio.len());
            self.session = Some(ActiveSession {
                unit_ids: unit_ids.clone(),
            });
            self.dispatch_play(audio, speed, repr_unit, unit_ids);
            send_reply(
                reply,
                Response::Tts(TtsOutcome::ok("Playing cached audio", true)),
            );
            return;
        }

        debug!("Cache miss, synthesizing (generation {})", self.generation);
        self.pending = Some(PendingSynthesis {
            text: text.clone(),
            voice: voice.clone(),
            speed,
            unit_ids,
            repr_unit,
            reply,
        });

        let client = Arc::clone(&self.client);
        let self_tx = self.self_tx.clone();
        let generation = self.generation;
        let request = SynthesisRequest {
            text,
            voice,
            api_key,
        };
        thread::spawn(move || {
            let result = client.synthesize(&request);
            // The loop may be gone if we are shutting down
            let _ = self_tx.send(BackgroundMessage::SynthDone { generation, result });
        });
    }

    fn on_synth_done(&mut self, generation: u64, result: Result<Vec<u8>>) {
        if generation != self.generation {
            debug!(
                "Discarding stale synthesis result (generation {} != {})",
                generation, self.generation
            );
            return;
        }
        let Some(pending) = self.pending.take() else {
            debug!("Synthesis result with no pending request");
            return;
        };

        match result {
            Ok(audio) => {
                self.cache
                    .put(&pending.text, &pending.voice, pending.speed, audio.clone());
                self.session = Some(ActiveSession {
                    unit_ids: pending.unit_ids.clone(),
                });
                self.dispatch_play(audio, pending.speed, pending.repr_unit, pending.unit_ids);
                send_reply(
                    pending.reply,
                    Response::Tts(TtsOutcome::ok("Playing audio", false)),
                );
            }
            Err(e) => {
                error!("Synthesis failed: {}", e);
                self.update_icons(&pending.unit_ids, IconUpdate::Error);
                send_reply(pending.reply, Response::Tts(TtsOutcome::err(e.to_string())));
            }
        }
    }

    /// Hand a clip to the page for playback. Fire and forget; the page
    /// reports back through audio lifecycle events.
    fn dispatch_play(
        &mut self,
        audio: Vec<u8>,
        speed: f32,
        repr_unit: Option<UnitId>,
        unit_ids: Vec<UnitId>,
    ) {
        let action = PageAction::PlayAudio {
            audio_data: BASE64.encode(audio),
            speed,
            paragraph_id: repr_unit,
            paragraph_ids: unit_ids,
        };
        if self.page.send(PageMessage::Action(action, None)).is_err() {
            warn!("Page context gone, dropping audio");
            self.session = None;
        }
    }

    /// Stop playback and invalidate any in-flight synthesis. `superseded`
    /// tags the stop so the page knows whether a new request is replacing
    /// this one (and keeps its reading state) or the user halted everything.
    fn stop_all(&mut self, superseded: bool) {
        self.generation += 1;

        if let Some(pending) = self.pending.take() {
            debug!("Superseding pending synthesis");
            self.update_icons(&pending.unit_ids, IconUpdate::Stopped);
            send_reply(pending.reply, Response::Tts(TtsOutcome::err("Stopped")));
        }

        if let Some(session) = self.session.take() {
            let _ = self.page.send(PageMessage::Action(
                PageAction::StopAudio { superseded },
                None,
            ));
            self.update_icons(&session.unit_ids, IconUpdate::Stopped);
        }
    }

    /// Fold a playback lifecycle event into the session and unit markers
    fn on_audio_event(&mut self, event: AudioLifecycle, paragraph_id: UnitId) {
        let session_ids = self
            .session
            .as_ref()
            .map(|s| s.unit_ids.clone())
            .filter(|ids| !ids.is_empty())
            .unwrap_or_else(|| vec![paragraph_id.clone()]);

        match event {
            AudioLifecycle::Started => {
                debug!("Audio started for {}", paragraph_id);
                self.update_icons(&session_ids, IconUpdate::Playing);
            }
            AudioLifecycle::Ended => {
                debug!("Audio ended for {}", paragraph_id);
                self.update_icons(&session_ids, IconUpdate::Ended);
                self.session = None;
            }
            AudioLifecycle::Error => {
                warn!("Audio error for {}", paragraph_id);
                self.update_icons(&session_ids, IconUpdate::Error);
                self.session = None;
            }
        }
    }

    fn update_icons(&self, unit_ids: &[UnitId], state: IconUpdate) {
        for id in unit_ids {
            let action = PageAction::UpdateIconState {
                paragraph_id: id.clone(),
                state,
            };
            if self.page.send(PageMessage::Action(action, None)).is_err() {
                return;
            }
        }
    }
}

fn send_reply(reply: Option<ReplySender>, response: Response) {
    if let Some(tx) = reply {
        let _ = tx.send(response);
    }
}
