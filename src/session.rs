//! Voice session: gestures in, conversation out
//!
//! Glues the layers together. Raw tap timestamps are classified by two gesture
//! contexts (triple tap toggles accessibility mode, double tap toggles the
//! record turn), and the resulting actions drive the conversation flow engine
//! and the transcriber. The triple-tap context is always live; the double-tap
//! context only participates while accessibility mode is on, and a recognized
//! triple tap resets it so the same taps never count toward both patterns.

use std::sync::Arc;
use std::time::Instant;

use crate::config::GestureConfig;
use crate::flow::{ConversationFlowEngine, FlowPhase};
use crate::gesture::{Gesture, GestureRecognizer};
use crate::speech::Transcriber;
use crate::turn::AudioTurnArbiter;
use crate::Result;

/// Spoken when accessibility mode turns on
pub const MODE_ENABLED_ANNOUNCEMENT: &str =
    "Accessibility mode enabled. Double tap anywhere to start speaking.";

/// Spoken when accessibility mode turns off
pub const MODE_DISABLED_ANNOUNCEMENT: &str = "Accessibility mode disabled.";

/// One user's voice interaction session
pub struct VoiceSession {
    mode_toggle: GestureRecognizer,
    record_toggle: GestureRecognizer,
    accessibility: bool,
    arbiter: Arc<AudioTurnArbiter>,
    engine: ConversationFlowEngine,
    transcriber: Box<dyn Transcriber>,
    language: String,
}

impl VoiceSession {
    /// Create a session in the disabled state
    #[must_use]
    pub fn new(
        arbiter: Arc<AudioTurnArbiter>,
        engine: ConversationFlowEngine,
        transcriber: Box<dyn Transcriber>,
        language: String,
        gestures: &GestureConfig,
    ) -> Self {
        Self {
            mode_toggle: GestureRecognizer::triple_tap(gestures.mode_toggle_window()),
            record_toggle: GestureRecognizer::double_tap(gestures.double_tap_window()),
            accessibility: false,
            arbiter,
            engine,
            transcriber,
            language,
        }
    }

    /// Whether accessibility mode is currently on
    #[must_use]
    pub const fn accessibility_enabled(&self) -> bool {
        self.accessibility
    }

    /// The conversation flow driven by this session
    #[must_use]
    pub const fn engine(&self) -> &ConversationFlowEngine {
        &self.engine
    }

    /// Ingest one raw tap and act on any gesture it completes
    ///
    /// Returns the gesture that was recognized and handled, if any.
    ///
    /// # Errors
    ///
    /// Returns error if a resulting announcement, flow transition, or capture
    /// operation fails.
    pub async fn on_tap(&mut self, at: Instant) -> Result<Option<Gesture>> {
        if self.mode_toggle.on_touch(at) == Some(Gesture::TripleTap) {
            // The taps that formed the triple must not also pair as doubles
            self.record_toggle.reset();
            self.toggle_accessibility().await?;
            return Ok(Some(Gesture::TripleTap));
        }

        if self.accessibility && self.record_toggle.on_touch(at) == Some(Gesture::DoubleTap) {
            self.handle_record_toggle().await?;
            return Ok(Some(Gesture::DoubleTap));
        }

        Ok(None)
    }

    async fn toggle_accessibility(&mut self) -> Result<()> {
        if self.accessibility {
            self.accessibility = false;
            self.record_toggle.reset();
            self.engine.cancel().await;
            tracing::info!("accessibility mode disabled");
            self.arbiter
                .speak_interrupting(MODE_DISABLED_ANNOUNCEMENT)
                .await?;
        } else {
            self.accessibility = true;
            tracing::info!("accessibility mode enabled");
            self.arbiter
                .speak_interrupting(MODE_ENABLED_ANNOUNCEMENT)
                .await?;
            self.engine.start().await?;
        }
        Ok(())
    }

    /// Double tap: close the open listen turn and feed the transcript through,
    /// or (re)open listening when nothing was recording
    async fn handle_record_toggle(&mut self) -> Result<()> {
        match self.engine.finish_listening().await? {
            Some((generation, audio)) => {
                let transcript = self.transcriber.transcribe(&audio, &self.language).await;
                if let Err(e) = tokio::fs::remove_file(audio.path()).await {
                    tracing::debug!(path = %audio.path().display(), error = %e, "failed to remove recording");
                }

                match transcript {
                    Ok(text) if !text.trim().is_empty() => {
                        self.engine.on_transcript(generation, text.trim()).await?;
                    }
                    Ok(_) => {
                        tracing::warn!("empty transcript, re-prompting");
                        self.engine.reprompt().await?;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "transcription failed, re-prompting");
                        self.engine.reprompt().await?;
                    }
                }
            }
            None => {
                if matches!(
                    self.engine.phase(),
                    FlowPhase::AwaitingInput(_) | FlowPhase::AwaitingConfirmation(_)
                ) {
                    self.engine.reopen_listening().await?;
                } else {
                    self.engine.start().await?;
                }
            }
        }
        Ok(())
    }
}
