//! Context wiring
//!
//! Builds the two event loop threads and the channels between them, and
//! gives callers a typed request/reply surface over the message protocol.

use crate::background::tts::TtsClient;
use crate::background::{BackgroundMessage, Dispatcher};
use crate::config::Config;
use crate::message::{BackgroundAction, PageAction, Response};
use crate::page::player::AudioPlayer;
use crate::page::{PageContext, PageMessage, PageSettings, ReadingDone};
use crate::{ReadifyError, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Replies must arrive within this window (synthesis included)
const REPLY_TIMEOUT: Duration = Duration::from_secs(120);

/// Both contexts plus the channels into them
pub struct Runtime {
    page_tx: Sender<PageMessage>,
    background_tx: Sender<BackgroundMessage>,
    done_rx: Receiver<ReadingDone>,
    page_handle: Option<JoinHandle<()>>,
    background_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the page and background threads
    pub fn start(
        config: &Config,
        client: Arc<dyn TtsClient>,
        player: Box<dyn AudioPlayer>,
    ) -> Self {
        let (page_tx, page_rx) = unbounded();
        let (background_tx, background_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();

        let settings = PageSettings {
            api_key: config.api_key(),
            voice: config.voice(),
            speed: config.speed(),
            show_icons: config.show_paragraph_icons(),
        };

        let page = PageContext::new(
            settings,
            player,
            background_tx.clone(),
            page_tx.clone(),
            Some(done_tx),
        );
        let page_handle = thread::Builder::new()
            .name("page".to_string())
            .spawn(move || page.run(page_rx));

        let dispatcher = Dispatcher::new(
            config.cache_size(),
            client,
            page_tx.clone(),
            background_tx.clone(),
        );
        let background_handle = thread::Builder::new()
            .name("background".to_string())
            .spawn(move || dispatcher.run(background_rx));

        Self {
            page_tx,
            background_tx,
            done_rx,
            page_handle: page_handle.ok(),
            background_handle: background_handle.ok(),
        }
    }

    /// Load (or reload) the page HTML
    pub fn load_document(&self, html: String) -> Result<()> {
        self.page_tx
            .send(PageMessage::DocumentChanged { html })
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))
    }

    /// Wait for the debounced rescan to surface units, up to `deadline`
    pub fn wait_for_units(&self, deadline: Duration) -> Result<Vec<(String, String, usize)>> {
        let until = Instant::now() + deadline;
        loop {
            let (tx, rx) = unbounded();
            self.page_tx
                .send(PageMessage::QueryUnits { reply: tx })
                .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))?;
            match rx.recv_timeout(REPLY_TIMEOUT) {
                Ok(Response::Units(units)) if !units.is_empty() => return Ok(units),
                Ok(_) => {}
                Err(_) => {
                    return Err(ReadifyError::Other("Page context not responding".to_string()))
                }
            }
            if Instant::now() >= until {
                return Err(ReadifyError::InvalidInput(
                    "No readable units found on page".to_string(),
                ));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Snapshot the current unit markers (id, state name)
    pub fn unit_states(&self) -> Result<Vec<(String, String)>> {
        let (tx, rx) = unbounded();
        self.page_tx
            .send(PageMessage::QueryStates { reply: tx })
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))?;
        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(Response::States(states)) => Ok(states),
            Ok(_) => Err(ReadifyError::Other("Unexpected reply".to_string())),
            Err(_) => Err(ReadifyError::Other(
                "Page context not responding".to_string(),
            )),
        }
    }

    /// Replace the tracked user selection
    pub fn set_selection(&self, text: Option<String>) -> Result<()> {
        self.page_tx
            .send(PageMessage::SetSelection { text })
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))
    }

    /// Start reading at a unit, optionally continuing to the end of the page
    pub fn read_from(&self, unit_id: &str, continuous: bool) -> Result<()> {
        self.page_tx
            .send(PageMessage::ReadFrom {
                unit_id: unit_id.to_string(),
                continuous,
                reply: None,
            })
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))
    }

    /// Send a page action and wait for its reply
    pub fn request_page(&self, action: PageAction) -> Result<Response> {
        let (tx, rx) = unbounded();
        self.page_tx
            .send(PageMessage::Action(action, Some(tx)))
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))?;
        rx.recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| ReadifyError::Other("Page context not responding".to_string()))
    }

    /// Send a background action and wait for its reply
    pub fn request_background(&self, action: BackgroundAction) -> Result<Response> {
        let (tx, rx) = unbounded();
        self.background_tx
            .send(BackgroundMessage::Action(action, Some(tx)))
            .map_err(|_| ReadifyError::Other("Background context is gone".to_string()))?;
        rx.recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| ReadifyError::Other("Background context not responding".to_string()))
    }

    /// Block until the current reading session ends
    pub fn wait_reading_done(&self) -> Result<ReadingDone> {
        self.done_rx
            .recv()
            .map_err(|_| ReadifyError::Other("Page context is gone".to_string()))
    }

    /// Stop both event loops and join their threads
    pub fn shutdown(mut self) {
        debug!("Shutting down runtime");
        let _ = self.background_tx.send(BackgroundMessage::Shutdown);
        let _ = self.page_tx.send(PageMessage::Shutdown);
        if let Some(handle) = self.background_handle.take() {
            if handle.join().is_err() {
                warn!("Background thread panicked");
            }
        }
        if let Some(handle) = self.page_handle.take() {
            if handle.join().is_err() {
                warn!("Page thread panicked");
            }
        }
    }
}
