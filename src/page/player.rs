//! Host audio playback
//!
//! Plays synthesized MP3 clips through an external player process, piping
//! the audio over stdin. ffplay is preferred, mpv is the fallback, and a
//! silent backend keeps the pipeline functional on machines with neither.
//!
//! Dependencies:
//! - ffplay (install with: sudo apt install ffmpeg), or
//! - mpv (install with: sudo apt install mpv)

use crate::Result;
use crate::ReadifyError;
use crossbeam::channel::Sender;
use log::{debug, error, info, warn};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How often the watcher thread polls a running player process
const WATCH_INTERVAL: Duration = Duration::from_millis(50);

/// How one playback session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Completion report for one playback session
#[derive(Debug, Clone)]
pub struct PlaybackUpdate {
    pub session: u64,
    pub outcome: PlaybackOutcome,
}

/// Audio playback backend
///
/// `play` replaces whatever is currently playing. The outcome of the new
/// session is reported asynchronously on `done`; a stopped session reports
/// nothing (the caller initiated the stop and already knows).
pub trait AudioPlayer: Send {
    fn play(
        &mut self,
        audio: Vec<u8>,
        speed: f32,
        session: u64,
        done: Sender<PlaybackUpdate>,
    ) -> Result<()>;

    /// Stop the current session, if any
    fn stop(&mut self);
}

/// Which external player binary we drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerKind {
    FfPlay,
    Mpv,
}

impl PlayerKind {
    fn binary(self) -> &'static str {
        match self {
            PlayerKind::FfPlay => "ffplay",
            PlayerKind::Mpv => "mpv",
        }
    }

    /// Build the player command reading MP3 from stdin at the given speed
    fn command(self, speed: f32) -> Command {
        // atempo only accepts 0.5-2.0 per filter instance
        let speed = speed.clamp(0.5, 2.0);
        let mut cmd = Command::new(self.binary());
        match self {
            PlayerKind::FfPlay => {
                cmd.arg("-autoexit")
                    .arg("-nodisp")
                    .arg("-loglevel")
                    .arg("quiet")
                    .arg("-af")
                    .arg(format!("atempo={}", speed))
                    .arg("-i")
                    .arg("-");
            }
            PlayerKind::Mpv => {
                cmd.arg("--no-video")
                    .arg("--really-quiet")
                    .arg(format!("--speed={}", speed))
                    .arg("-");
            }
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

/// Plays clips by piping them to an external player process
pub struct ProcessPlayer {
    kind: PlayerKind,
    /// Shared with the watcher thread; `stop` takes and kills the child
    current: Arc<Mutex<Option<Child>>>,
}

impl ProcessPlayer {
    /// Probe for a usable player binary
    pub fn new() -> Result<Self> {
        let kind = Self::find_player()?;
        debug!("Using audio player: {}", kind.binary());
        Ok(Self {
            kind,
            current: Arc::new(Mutex::new(None)),
        })
    }

    fn find_player() -> Result<PlayerKind> {
        for kind in [PlayerKind::FfPlay, PlayerKind::Mpv] {
            if let Ok(status) = Command::new(kind.binary())
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                if status.success() {
                    return Ok(kind);
                }
            }
        }

        Err(ReadifyError::Playback(
            "No audio player found. Install with: sudo apt install ffmpeg (or mpv)".to_string(),
        ))
    }

    fn kill_current(&mut self) {
        let Ok(mut guard) = self.current.lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            debug!("Killing player process");
            match child.kill() {
                Ok(_) => {
                    let _ = child.wait(); // Clean up zombie
                }
                Err(e) => {
                    debug!("Failed to kill player process: {}", e);
                }
            }
        }
    }
}

impl AudioPlayer for ProcessPlayer {
    fn play(
        &mut self,
        audio: Vec<u8>,
        speed: f32,
        session: u64,
        done: Sender<PlaybackUpdate>,
    ) -> Result<()> {
        self.kill_current();

        let mut child = self.kind.command(speed).spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", self.kind.binary(), e);
            ReadifyError::Playback(format!("Failed to start {}: {}", self.kind.binary(), e))
        })?;
        let stdin = child.stdin.take();

        {
            let Ok(mut guard) = self.current.lock() else {
                let _ = child.kill();
                return Err(ReadifyError::Playback("Player state poisoned".to_string()));
            };
            *guard = Some(child);
        }
        debug!(
            "Player started for session {} ({} bytes at {}x)",
            session,
            audio.len(),
            speed
        );

        let slot = Arc::clone(&self.current);
        thread::spawn(move || {
            // Feed the clip first; the player consumes as it plays, so this
            // blocks until the pipe drains or the process dies.
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&audio) {
                    debug!("Player stdin closed early: {}", e);
                }
            }

            loop {
                {
                    let Ok(mut guard) = slot.lock() else {
                        return;
                    };
                    match guard.as_mut() {
                        // Stopped from the outside; the caller already knows
                        None => return,
                        Some(child) => match child.try_wait() {
                            Ok(Some(status)) => {
                                guard.take();
                                let outcome = if status.success() {
                                    PlaybackOutcome::Finished
                                } else {
                                    PlaybackOutcome::Failed(format!(
                                        "Player exited with {}",
                                        status
                                    ))
                                };
                                let _ = done.send(PlaybackUpdate { session, outcome });
                                return;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                guard.take();
                                let _ = done.send(PlaybackUpdate {
                                    session,
                                    outcome: PlaybackOutcome::Failed(format!(
                                        "Player wait failed: {}",
                                        e
                                    )),
                                });
                                return;
                            }
                        },
                    }
                }
                thread::sleep(WATCH_INTERVAL);
            }
        });

        Ok(())
    }

    fn stop(&mut self) {
        self.kill_current();
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.kill_current();
    }
}

/// Silent backend for hosts with no player installed
///
/// Reports every clip as finished immediately so continuous reading still
/// advances through the document.
pub struct NullPlayer;

impl AudioPlayer for NullPlayer {
    fn play(
        &mut self,
        audio: Vec<u8>,
        _speed: f32,
        session: u64,
        done: Sender<PlaybackUpdate>,
    ) -> Result<()> {
        debug!("Null player discarding {} bytes", audio.len());
        let _ = done.send(PlaybackUpdate {
            session,
            outcome: PlaybackOutcome::Finished,
        });
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Create the best available playback backend
pub fn create_player() -> Box<dyn AudioPlayer> {
    match ProcessPlayer::new() {
        Ok(player) => {
            info!("Initialized process audio player");
            Box::new(player)
        }
        Err(e) => {
            warn!("No audio player available, playback will be silent: {}", e);
            Box::new(NullPlayer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn null_player_reports_finished() {
        let (tx, rx) = unbounded();
        let mut player = NullPlayer;
        player.play(vec![1, 2, 3], 1.0, 7, tx).unwrap();
        let update = rx.recv().unwrap();
        assert_eq!(update.session, 7);
        assert_eq!(update.outcome, PlaybackOutcome::Finished);
    }

    #[test]
    fn speed_is_clamped_into_atempo_range() {
        let cmd = PlayerKind::FfPlay.command(5.0);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"atempo=2".to_string()));

        let cmd = PlayerKind::Mpv.command(0.1);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"--speed=0.5".to_string()));
    }
}
