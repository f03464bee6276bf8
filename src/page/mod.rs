//! Page context
//!
//! Owns everything that lives "on the page": the scanned unit list, the
//! per-unit visual markers, the selection, and audio playback. Runs as one
//! event loop thread; every interaction with it goes through a
//! [`PageMessage`]. Synthesis itself happens in the background context, so
//! reading a unit here means building a chunk and handing it across.

pub mod chunk;
pub mod document;
pub mod extract;
pub mod icons;
pub mod player;
pub mod scan;

use crate::background::BackgroundMessage;
use crate::message::{
    Ack, AudioLifecycle, BackgroundAction, ExtractResult, PageAction, ReplySender, Response,
    TtsOutcome, UnitId,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use self::document::Document;
use self::icons::IconRegistry;
use self::player::{AudioPlayer, PlaybackOutcome, PlaybackUpdate};
use self::scan::Aggregator;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Error markers clear themselves after this long
const ERROR_CLEAR_DELAY: Duration = Duration::from_secs(3);
/// Document mutations are coalesced within this window before rescanning
const MUTATION_DEBOUNCE: Duration = Duration::from_millis(100);
/// Event loop tick when nothing is scheduled
const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Requests handled by the page event loop
pub enum PageMessage {
    /// A protocol action, optionally expecting a reply
    Action(PageAction, Option<ReplySender>),
    /// Start reading at a unit, optionally continuing through the document
    ReadFrom {
        unit_id: UnitId,
        continuous: bool,
        reply: Option<ReplySender>,
    },
    /// The page HTML changed (also used for the initial load)
    DocumentChanged { html: String },
    /// The user's selection changed
    SetSelection { text: Option<String> },
    /// Outcome of a synthesis request this context initiated, stamped with
    /// the read generation it was issued under
    SynthOutcome {
        generation: u64,
        outcome: TtsOutcome,
    },
    /// Diagnostic: current units
    QueryUnits { reply: ReplySender },
    /// Diagnostic: current unit markers
    QueryStates { reply: ReplySender },
    Shutdown,
}

/// Signal that a reading session is over (finished, failed, or ran out of
/// document). The binary uses this to know when to exit.
#[derive(Debug, Clone)]
pub struct ReadingDone {
    pub error: Option<String>,
}

/// Fixed page-side settings captured at startup
pub struct PageSettings {
    pub api_key: Option<String>,
    pub voice: String,
    pub speed: f32,
    pub show_icons: bool,
}

/// Currently playing clip
struct PlayingSession {
    session: u64,
    /// Representative unit reported in lifecycle events
    repr_unit: UnitId,
}

/// Active reading request spanning one or more chunks
struct ReadingState {
    continuous: bool,
    /// Last unit of the chunk most recently requested
    last_unit: UnitId,
}

type DelayedFn = Box<dyn FnOnce(&mut PageContext) + Send>;

/// The page event loop state
pub struct PageContext {
    aggregator: Aggregator,
    icons: IconRegistry,
    player: Box<dyn AudioPlayer>,
    document: Option<Document>,
    selection: Option<String>,
    speed: f32,
    settings: PageSettings,

    background: Sender<BackgroundMessage>,
    /// Sender into our own loop, used to route async outcomes back here
    self_tx: Sender<PageMessage>,
    playback_tx: Sender<PlaybackUpdate>,
    playback_rx: Receiver<PlaybackUpdate>,
    done_tx: Option<Sender<ReadingDone>>,

    session_counter: u64,
    playing: Option<PlayingSession>,
    reading: Option<ReadingState>,
    /// Bumped on every synthesis request and every user stop; outcomes
    /// stamped with an older generation belong to a superseded request
    read_generation: u64,

    /// Functions scheduled to run after a delay (error marker clears)
    delayed: Vec<(Instant, DelayedFn)>,
    /// Coalesced document mutation waiting for its debounce window
    pending_html: Option<String>,
    rescan_at: Option<Instant>,
}

impl PageContext {
    pub fn new(
        settings: PageSettings,
        player: Box<dyn AudioPlayer>,
        background: Sender<BackgroundMessage>,
        self_tx: Sender<PageMessage>,
        done_tx: Option<Sender<ReadingDone>>,
    ) -> Self {
        let (playback_tx, playback_rx) = unbounded();
        Self {
            aggregator: Aggregator::new(),
            icons: IconRegistry::new(settings.show_icons),
            player,
            document: None,
            selection: None,
            speed: settings.speed,
            settings,
            background,
            self_tx,
            playback_tx,
            playback_rx,
            done_tx,
            session_counter: 0,
            playing: None,
            reading: None,
            read_generation: 0,
            delayed: Vec::new(),
            pending_html: None,
            rescan_at: None,
        }
    }

    /// Run the event loop until shutdown or channel disconnect
    pub fn run(mut self, requests: Receiver<PageMessage>) {
        info!("Page context started");
        let playback_rx = self.playback_rx.clone();

        loop {
            self.run_scheduled();

            let timeout = self
                .time_until_next_scheduled()
                .map(|d| d.min(DEFAULT_TICK))
                .unwrap_or(DEFAULT_TICK);

            crossbeam::channel::select! {
                recv(requests) -> msg => match msg {
                    Ok(PageMessage::Shutdown) | Err(_) => break,
                    Ok(msg) => self.handle(msg),
                },
                recv(playback_rx) -> update => {
                    if let Ok(update) = update {
                        self.on_playback(update);
                    }
                }
                default(timeout) => {}
            }
        }

        self.player.stop();
        info!("Page context stopped");
    }

    // ========== Scheduling ==========

    fn schedule<F>(&mut self, delay: Duration, func: F)
    where
        F: FnOnce(&mut PageContext) + Send + 'static,
    {
        self.delayed.push((Instant::now() + delay, Box::new(func)));
    }

    fn run_scheduled(&mut self) {
        let now = Instant::now();

        if self.rescan_at.is_some_and(|at| now >= at) {
            self.rescan_at = None;
            if let Some(html) = self.pending_html.take() {
                self.apply_document(&html);
            }
        }

        let mut to_run = Vec::new();
        let mut i = 0;
        while i < self.delayed.len() {
            if now >= self.delayed[i].0 {
                to_run.push(self.delayed.remove(i));
            } else {
                i += 1;
            }
        }
        for (_when, func) in to_run {
            func(self);
        }
    }

    fn time_until_next_scheduled(&self) -> Option<Duration> {
        let now = Instant::now();
        self.delayed
            .iter()
            .map(|(when, _)| *when)
            .chain(self.rescan_at)
            .min()
            .map(|next| next.saturating_duration_since(now))
    }

    // ========== Message handling ==========

    fn handle(&mut self, msg: PageMessage) {
        match msg {
            PageMessage::Action(action, reply) => self.handle_action(action, reply),
            PageMessage::ReadFrom {
                unit_id,
                continuous,
                reply,
            } => self.start_reading(&unit_id, continuous, reply),
            PageMessage::DocumentChanged { html } => {
                // Coalesce bursts of mutations into one rescan
                self.pending_html = Some(html);
                self.rescan_at = Some(Instant::now() + MUTATION_DEBOUNCE);
            }
            PageMessage::SetSelection { text } => {
                self.selection = text.map(|t| extract::clean_selection(&t));
            }
            PageMessage::SynthOutcome {
                generation,
                outcome,
            } => {
                if generation != self.read_generation {
                    debug!("Ignoring synthesis outcome from a superseded request");
                } else if !outcome.success {
                    let error = outcome
                        .error
                        .unwrap_or_else(|| "Synthesis failed".to_string());
                    warn!("Synthesis request failed: {}", error);
                    if self.reading.take().is_some() {
                        self.notify_done(Some(error));
                    }
                }
            }
            PageMessage::QueryUnits { reply } => {
                let units = self
                    .aggregator
                    .units()
                    .iter()
                    .map(|u| (u.id.clone(), u.kind.name().to_string(), u.chars))
                    .collect();
                let _ = reply.send(Response::Units(units));
            }
            PageMessage::QueryStates { reply } => {
                let _ = reply.send(Response::States(self.icons.snapshot()));
            }
            PageMessage::Shutdown => {}
        }
    }

    fn handle_action(&mut self, action: PageAction, reply: Option<ReplySender>) {
        match action {
            PageAction::ExtractPageText => {
                let result = match self.document.as_ref() {
                    Some(doc) => match extract::extract_page_text(doc) {
                        Ok(out) => ExtractResult {
                            success: true,
                            text: Some(out.text),
                            source: out.source.to_string(),
                            error: None,
                        },
                        Err(e) => ExtractResult {
                            success: false,
                            text: None,
                            source: "none".to_string(),
                            error: Some(e.to_string()),
                        },
                    },
                    None => ExtractResult {
                        success: false,
                        text: None,
                        source: "none".to_string(),
                        error: Some("No document loaded".to_string()),
                    },
                };
                send_reply(reply, Response::Extract(result));
            }
            PageAction::GetSelectedText => {
                let result = match self.selection.as_ref() {
                    Some(text) if !text.is_empty() => ExtractResult {
                        success: true,
                        text: Some(text.clone()),
                        source: "selection".to_string(),
                        error: None,
                    },
                    _ => ExtractResult {
                        success: false,
                        text: None,
                        source: "selection".to_string(),
                        error: Some("No text selected".to_string()),
                    },
                };
                send_reply(reply, Response::Extract(result));
            }
            PageAction::ReadParagraph { paragraph_id } => {
                self.read_single(&paragraph_id, reply);
            }
            PageAction::UpdateIconState {
                paragraph_id,
                state,
            } => {
                if self.icons.apply(&paragraph_id, state) {
                    let id = paragraph_id.clone();
                    self.schedule(ERROR_CLEAR_DELAY, move |ctx| ctx.icons.clear_error(&id));
                }
                send_reply(reply, Response::Ack(Ack::ok()));
            }
            PageAction::ToggleParagraphIcons { show } => {
                self.icons.set_enabled(show);
                send_reply(reply, Response::Ack(Ack::ok()));
            }
            PageAction::PlayAudio {
                audio_data,
                speed,
                paragraph_id,
                paragraph_ids,
            } => {
                let ack = self.play_audio(&audio_data, speed, paragraph_id, paragraph_ids);
                send_reply(reply, Response::Ack(ack));
            }
            PageAction::StopAudio { superseded } => {
                self.stop_playback(superseded);
                send_reply(reply, Response::Ack(Ack::ok()));
            }
            PageAction::UpdatePlaybackSpeed { speed } => {
                debug!("Playback speed set to {}x (applies from next clip)", speed);
                self.speed = speed;
                send_reply(reply, Response::Ack(Ack::ok()));
            }
        }
    }

    // ========== Document ==========

    fn apply_document(&mut self, html: &str) {
        match Document::parse(html) {
            Ok(doc) => {
                let count = self.aggregator.rescan(&doc);
                let valid: HashSet<UnitId> =
                    self.aggregator.units().iter().map(|u| u.id.clone()).collect();
                self.icons.retain(&valid);
                self.document = Some(doc);
                debug!("Document applied, {} units", count);
            }
            Err(e) => error!("Failed to parse document: {}", e),
        }
    }

    // ========== Reading ==========

    /// Read one unit on its own
    fn read_single(&mut self, unit_id: &str, reply: Option<ReplySender>) {
        let Some(unit) = self.aggregator.get(unit_id) else {
            send_reply(
                reply,
                Response::Tts(TtsOutcome::err(format!("Unknown unit id: {}", unit_id))),
            );
            return;
        };
        let text = unit.text.clone();
        let ids = vec![unit.id.clone()];
        let last = unit.id.clone();
        self.reading = Some(ReadingState {
            continuous: false,
            last_unit: last.clone(),
        });
        self.request_synthesis(text, ids, last, reply);
    }

    /// Read from a unit onward, chunking ahead
    fn start_reading(&mut self, unit_id: &str, continuous: bool, reply: Option<ReplySender>) {
        let chunk = match chunk::build_chunk(self.aggregator.units(), unit_id) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Cannot read from {}: {}", unit_id, e);
                send_reply(reply, Response::Tts(TtsOutcome::err(e.to_string())));
                self.notify_done(Some(e.to_string()));
                return;
            }
        };

        self.reading = Some(ReadingState {
            continuous,
            last_unit: chunk.last_unit_id.clone(),
        });
        self.request_synthesis(chunk.text, chunk.unit_ids, chunk.last_unit_id, reply);
    }

    fn request_synthesis(
        &mut self,
        text: String,
        unit_ids: Vec<UnitId>,
        last_unit: UnitId,
        reply: Option<ReplySender>,
    ) {
        self.read_generation += 1;
        let generation = self.read_generation;

        self.icons.set_loading(&unit_ids);
        let action = BackgroundAction::StartTts {
            text,
            api_key: self.settings.api_key.clone().unwrap_or_default(),
            speed: self.speed,
            voice: self.settings.voice.clone(),
            paragraph_ids: Some(unit_ids),
            last_paragraph_id: Some(last_unit),
        };

        // The dispatcher replies once, but this loop needs to hear about
        // failures too (a stalled reading session must end). Relay the
        // outcome back into the loop as well as to the original caller.
        let (tx, rx) = unbounded::<Response>();
        let self_tx = self.self_tx.clone();
        std::thread::spawn(move || {
            if let Ok(response) = rx.recv() {
                if let Response::Tts(outcome) = &response {
                    let _ = self_tx.send(PageMessage::SynthOutcome {
                        generation,
                        outcome: outcome.clone(),
                    });
                }
                if let Some(caller) = reply {
                    let _ = caller.send(response);
                }
            }
        });

        if self
            .background
            .send(BackgroundMessage::Action(action, Some(tx)))
            .is_err()
        {
            error!("Background context is gone, cannot synthesize");
            self.notify_done(Some("Background context unavailable".to_string()));
        }
    }

    // ========== Playback ==========

    fn play_audio(
        &mut self,
        audio_data: &str,
        speed: f32,
        paragraph_id: Option<UnitId>,
        paragraph_ids: Vec<UnitId>,
    ) -> Ack {
        let audio = match BASE64.decode(audio_data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Undecodable audio payload: {}", e);
                return Ack::err(format!("Invalid audio data: {}", e));
            }
        };

        let repr_unit = paragraph_id
            .or_else(|| paragraph_ids.last().cloned())
            .unwrap_or_default();

        self.session_counter += 1;
        let session = self.session_counter;

        match self
            .player
            .play(audio, speed, session, self.playback_tx.clone())
        {
            Ok(()) => {
                debug!(
                    "Playback session {} covers {} units",
                    session,
                    paragraph_ids.len()
                );
                self.playing = Some(PlayingSession {
                    session,
                    repr_unit: repr_unit.clone(),
                });
                if !repr_unit.is_empty() {
                    self.send_audio_event(AudioLifecycle::Started, repr_unit);
                }
                Ack::ok()
            }
            Err(e) => {
                error!("Playback failed to start: {}", e);
                if !repr_unit.is_empty() {
                    self.send_audio_event(AudioLifecycle::Error, repr_unit);
                }
                self.notify_done(Some(e.to_string()));
                Ack::err(e.to_string())
            }
        }
    }

    /// Halt the current clip. A supersession stop arrives from the
    /// dispatcher after a new request of ours already replaced the reading
    /// state, so only a user stop may clear it and end the session.
    fn stop_playback(&mut self, superseded: bool) {
        self.player.stop();
        self.playing = None;
        if !superseded {
            self.read_generation += 1;
            if self.reading.take().is_some() {
                self.notify_done(None);
            }
        }
    }

    /// Completion report from the player thread
    fn on_playback(&mut self, update: PlaybackUpdate) {
        // Reports from superseded sessions are stale
        let current = match self.playing.as_ref() {
            Some(p) if p.session == update.session => p,
            _ => {
                debug!("Ignoring stale playback update for session {}", update.session);
                return;
            }
        };
        let repr_unit = current.repr_unit.clone();
        self.playing = None;

        match update.outcome {
            PlaybackOutcome::Finished => {
                debug!("Session {} finished", update.session);
                self.send_audio_event(AudioLifecycle::Ended, repr_unit);
                self.advance_reading();
            }
            PlaybackOutcome::Failed(msg) => {
                error!("Session {} failed: {}", update.session, msg);
                self.send_audio_event(AudioLifecycle::Error, repr_unit);
                self.reading = None;
                self.notify_done(Some(msg));
            }
        }
    }

    /// Continue a continuous reading session with the next chunk
    fn advance_reading(&mut self) {
        let Some(reading) = self.reading.take() else {
            self.notify_done(None);
            return;
        };
        if !reading.continuous {
            self.notify_done(None);
            return;
        }

        match self.aggregator.next_after(&reading.last_unit) {
            Some(next) => {
                let next_id = next.id.clone();
                debug!("Continuing reading at {}", next_id);
                self.start_reading(&next_id, true, None);
            }
            None => {
                info!("Reached end of document");
                self.notify_done(None);
            }
        }
    }

    fn send_audio_event(&self, event: AudioLifecycle, paragraph_id: UnitId) {
        let action = BackgroundAction::AudioEvent {
            event,
            paragraph_id,
        };
        if self.background.send(BackgroundMessage::Action(action, None)).is_err() {
            debug!("Background context gone, dropping audio event");
        }
    }

    fn notify_done(&self, error: Option<String>) {
        if let Some(tx) = self.done_tx.as_ref() {
            let _ = tx.send(ReadingDone { error });
        }
    }
}

fn send_reply(reply: Option<ReplySender>, response: Response) {
    if let Some(tx) = reply {
        let _ = tx.send(response);
    }
}
