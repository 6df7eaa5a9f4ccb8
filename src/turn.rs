//! Audio turn arbitration
//!
//! Exactly one component may drive the speaker or microphone at a time. The
//! arbiter owns that right as an explicit state machine (`Idle` / `Speaking` /
//! `Listening` / `Processing`) and serializes every speak/listen request
//! through it. Callers waiting for the device suspend on a [`Notify`] gate
//! rather than polling a flag, and every completed or failed operation returns
//! the arbiter to `Idle` — it is never left parked in a busy state.
//!
//! One arbiter instance exists per running app. It is constructed once at the
//! composition root and shared by reference; it is the sole owner of the
//! synthesis and capture collaborators.

use std::time::Instant;

use tokio::sync::{Mutex, Notify};

use crate::speech::{
    AudioRef, CaptureFormat, RecordingHandle, SpeechCapture, SpeechSynthesis, VoiceParams,
};
use crate::{Error, Result};

/// Who holds the audio device right now
#[derive(Debug, Clone)]
pub enum AudioTurn {
    /// Device is free
    Idle,
    /// Speaking an utterance through the synthesis collaborator
    Speaking {
        /// Text being rendered
        utterance: String,
        /// When the turn started
        since: Instant,
    },
    /// Recording from the capture collaborator
    Listening {
        /// When the turn started
        since: Instant,
    },
    /// Finalizing a recording
    Processing,
}

impl AudioTurn {
    /// Whether the device is free
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Short label for logging
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Speaking { .. } => "speaking",
            Self::Listening { .. } => "listening",
            Self::Processing => "processing",
        }
    }
}

/// Handle for one open listen turn
///
/// Consumed by [`AudioTurnArbiter::stop_listening`]. The handle is stamped
/// with the arbiter generation it was issued under; a handle that predates an
/// [`AudioTurnArbiter::interrupt`] is stale and closing it returns
/// [`Error::Interrupted`].
#[derive(Debug)]
pub struct ListenHandle {
    recording: RecordingHandle,
    generation: u64,
}

struct TurnSlot {
    turn: AudioTurn,
    generation: u64,
    recording: Option<RecordingHandle>,
}

/// Serializes exclusive use of the speaker and microphone
pub struct AudioTurnArbiter {
    slot: Mutex<TurnSlot>,
    idle: Notify,
    synthesis: Box<dyn SpeechSynthesis>,
    capture: Box<dyn SpeechCapture>,
    params: VoiceParams,
    format: CaptureFormat,
}

impl AudioTurnArbiter {
    /// Create the arbiter around its synthesis and capture collaborators
    #[must_use]
    pub fn new(
        synthesis: Box<dyn SpeechSynthesis>,
        capture: Box<dyn SpeechCapture>,
        params: VoiceParams,
        format: CaptureFormat,
    ) -> Self {
        Self {
            slot: Mutex::new(TurnSlot {
                turn: AudioTurn::Idle,
                generation: 0,
                recording: None,
            }),
            idle: Notify::new(),
            synthesis,
            capture,
            params,
            format,
        }
    }

    /// Snapshot of the current turn
    pub async fn turn(&self) -> AudioTurn {
        self.slot.lock().await.turn.clone()
    }

    /// Suspend until the device is free
    ///
    /// Used before starting an operation that must not race a prior
    /// speak/listen still draining.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.slot.lock().await.turn.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for `Idle`, claim the turn, and return the generation it ran under
    async fn acquire(&self, next: AudioTurn) -> u64 {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut slot = self.slot.lock().await;
                if slot.turn.is_idle() {
                    slot.turn = next.clone();
                    return slot.generation;
                }
            }
            notified.await;
        }
    }

    /// Return the turn to `Idle`, unless an interrupt superseded it
    async fn release(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation == generation {
            slot.turn = AudioTurn::Idle;
            slot.recording = None;
            drop(slot);
            self.idle.notify_waiters();
        }
    }

    /// Speak an utterance, resolving once playback has finished
    ///
    /// Waits for the device to become free; concurrent `speak`/`listen` calls
    /// are serialized system-wide, never interleaved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpeechDevice`] if the synthesis collaborator fails.
    /// The arbiter has already reset itself to `Idle`; retry policy belongs to
    /// the caller.
    pub async fn speak(&self, text: &str) -> Result<()> {
        let generation = self
            .acquire(AudioTurn::Speaking {
                utterance: text.to_string(),
                since: Instant::now(),
            })
            .await;
        tracing::debug!(synthesis = self.synthesis.name(), utterance = text, "speaking");

        // Playback left behind by an interrupted turn is torn down before a
        // new sink starts; two playback resources are never live at once.
        self.synthesis.stop().await;

        let outcome = self.synthesis.play(text, &self.params).await;
        self.release(generation).await;

        outcome.map_err(|e| {
            tracing::error!(error = %e, "speech synthesis failed");
            match e {
                Error::SpeechDevice(_) => e,
                other => Error::SpeechDevice(other.to_string()),
            }
        })
    }

    /// Tear down any in-flight turn, then speak
    ///
    /// This is the replacement path: the previous utterance's playback is
    /// stopped and released before the new one starts.
    ///
    /// # Errors
    ///
    /// Same as [`Self::speak`].
    pub async fn speak_interrupting(&self, text: &str) -> Result<()> {
        self.interrupt().await;
        self.speak(text).await
    }

    /// Open a listen turn, starting the capture collaborator
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpeechDevice`] if capture cannot start (the turn is
    /// released), or [`Error::Interrupted`] if an interrupt raced the device
    /// start.
    pub async fn listen(&self) -> Result<ListenHandle> {
        let generation = self
            .acquire(AudioTurn::Listening {
                since: Instant::now(),
            })
            .await;

        match self.capture.start(self.format).await {
            Ok(recording) => {
                let mut slot = self.slot.lock().await;
                if slot.generation != generation {
                    // Interrupted while the device was spinning up
                    drop(slot);
                    let _ = self.capture.stop(recording).await;
                    return Err(Error::Interrupted);
                }
                slot.recording = Some(recording);
                drop(slot);
                tracing::debug!(capture = self.capture.name(), %recording, "listening");
                Ok(ListenHandle {
                    recording,
                    generation,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "speech capture failed to start");
                self.release(generation).await;
                Err(match e {
                    Error::SpeechDevice(_) => e,
                    other => Error::SpeechDevice(other.to_string()),
                })
            }
        }
    }

    /// Close a listen turn and return the recorded audio's reference
    ///
    /// Transitions `Listening -> Processing` while the recording is finalized,
    /// then back to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interrupted`] for a handle invalidated by
    /// [`Self::interrupt`], or [`Error::SpeechDevice`] if finalization fails.
    ///
    /// # Panics
    ///
    /// Panics if called while the turn is not `Listening` — a listen handle
    /// with a live generation implies a listening turn, so this is a
    /// programming defect, not a runtime condition.
    pub async fn stop_listening(&self, handle: ListenHandle) -> Result<AudioRef> {
        {
            let mut slot = self.slot.lock().await;
            if slot.generation != handle.generation {
                tracing::debug!(recording = %handle.recording, "stale listen handle");
                return Err(Error::Interrupted);
            }
            match slot.turn {
                AudioTurn::Listening { .. } => {
                    slot.turn = AudioTurn::Processing;
                    slot.recording = None;
                }
                ref other => panic!(
                    "audio turn invariant violated: stop_listening while {}",
                    other.label()
                ),
            }
        }

        let outcome = self.capture.stop(handle.recording).await;
        // The turn goes back to Idle even when finalization fails
        self.release(handle.generation).await;

        match outcome {
            Ok(audio) => {
                tracing::debug!(path = %audio.path().display(), "capture finalized");
                Ok(audio)
            }
            Err(e) => {
                tracing::error!(error = %e, "speech capture failed to finalize");
                Err(match e {
                    Error::SpeechDevice(_) => e,
                    other => Error::SpeechDevice(other.to_string()),
                })
            }
        }
    }

    /// Force the turn back to `Idle`, tearing down playback or capture
    ///
    /// Invalidates outstanding listen handles and any release still draining
    /// from the superseded turn. Safe to call while idle.
    pub async fn interrupt(&self) {
        let (previous, recording) = {
            let mut slot = self.slot.lock().await;
            if slot.turn.is_idle() {
                return;
            }
            slot.generation += 1;
            let recording = slot.recording.take();
            (
                std::mem::replace(&mut slot.turn, AudioTurn::Idle),
                recording,
            )
        };

        match &previous {
            AudioTurn::Speaking { .. } => self.synthesis.stop().await,
            AudioTurn::Listening { .. } | AudioTurn::Processing => {
                if let Some(recording) = recording {
                    if let Err(e) = self.capture.stop(recording).await {
                        tracing::warn!(error = %e, "capture teardown failed");
                    }
                }
            }
            AudioTurn::Idle => {}
        }

        self.idle.notify_waiters();
        tracing::info!(from = previous.label(), "audio turn interrupted");
    }
}
