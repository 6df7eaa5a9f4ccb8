//! Conversational slot-filling flow
//!
//! Drives a step-ordered conversation (e.g. phone → otp → upiPin → complete):
//! speak the step's prompt, listen, hand the transcript to the intent
//! resolver, commit or confirm the recognized value, advance. The resolver —
//! not a fixed local table — decides the step to advance to, which allows
//! branching; the configured step list supplies prompts, validators, and the
//! terminal step.
//!
//! All audio goes through the shared [`AudioTurnArbiter`]; the engine never
//! touches the device directly.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::speech::AudioRef;
use crate::turn::{AudioTurnArbiter, ListenHandle};
use crate::{Error, Result};

/// Spoken when a transcript produced no usable value
pub const RETRY_PROMPT: &str = "Sorry, I didn't catch that. Please try again.";

/// Appended to every confirmation question
pub const CONFIRM_INSTRUCTION: &str = "Say yes to confirm or no to try again.";

/// Fallback completion message when the terminal step has no prompt
const COMPLETION_MESSAGE: &str = "Registration complete. Thank you.";

/// Fallback when the resolver branches to a step with no configured prompt
const CONTINUE_PROMPT: &str = "Okay, let's continue.";

/// What the resolver understood from one utterance
#[derive(Debug, Clone, Deserialize)]
pub struct IntentResolution {
    /// Step to advance to next
    pub step: String,
    /// Value recognized for the current step, if any
    #[serde(default)]
    pub value: Option<String>,
    /// Message to speak back to the user
    #[serde(default)]
    pub message: String,
    /// Whether the value must be confirmed before it is committed
    #[serde(default, alias = "needsConfirmation")]
    pub needs_confirmation: bool,
}

/// Intent-resolution collaborator: the "understand this utterance" backend
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// Resolve a transcript against the current step and collected slots
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails or its response is malformed
    async fn resolve(
        &self,
        transcript: &str,
        current_step: &str,
        slots: &IndexMap<String, String>,
    ) -> Result<IntentResolution>;
}

/// Persistence collaborator: receives the collected slots at flow completion
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Persist the collected slots (idempotent)
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written
    async fn save(&self, slots: &IndexMap<String, String>) -> Result<()>;
}

/// Per-step slot validator
pub type SlotValidator = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// One stage of the conversation: a slot, its prompt, and its validator
pub struct FlowStep {
    /// Step identifier (slot name)
    pub id: String,
    /// Prompt spoken when this step becomes current
    pub prompt: String,
    validator: Option<SlotValidator>,
}

impl FlowStep {
    /// Create a step with no validator (any recognized value is accepted)
    #[must_use]
    pub fn new(id: &str, prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            validator: None,
        }
    }

    /// Attach a validator for recognized values
    #[must_use]
    pub fn with_validator(mut self, validator: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    fn accepts(&self, value: &str) -> bool {
        self.validator.as_ref().is_none_or(|v| v(value))
    }
}

/// Where the flow currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowPhase {
    /// `start()` has not been called (or the flow was reset)
    NotStarted,
    /// Waiting for an utterance for the named step
    AwaitingInput(String),
    /// A candidate value for the named step awaits confirmation
    AwaitingConfirmation(String),
    /// Terminal: all slots collected and persisted
    Complete,
    /// Terminal: flow was cancelled; only `start()` leaves this state
    Cancelled,
}

/// A recognized value held back until the user confirms it
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// Step the candidate belongs to
    pub step: String,
    /// The uncommitted value
    pub candidate: String,
    /// Confirmation question spoken to the user
    pub prompt: String,
    next_step: String,
}

/// What one transcript did to the flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Value committed, flow advanced to the named step
    Advanced(String),
    /// Candidate stored; waiting for yes/no
    AwaitingConfirmation,
    /// Nothing usable; same step re-prompted
    Reprompted,
    /// Terminal step reached, slots persisted
    Completed,
    /// Stale or out-of-phase transcript, ignored
    Discarded,
}

/// Step-ordered slot-filling controller
pub struct ConversationFlowEngine {
    steps: Vec<FlowStep>,
    terminal: String,
    arbiter: Arc<AudioTurnArbiter>,
    resolver: Box<dyn IntentResolver>,
    store: Box<dyn SlotStore>,
    phase: FlowPhase,
    slots: IndexMap<String, String>,
    pending: Option<PendingConfirmation>,
    active_listen: Option<ListenHandle>,
    generation: u64,
}

impl ConversationFlowEngine {
    /// Create an engine over an ordered step list; the last step is terminal
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `steps` is empty.
    pub fn new(
        steps: Vec<FlowStep>,
        arbiter: Arc<AudioTurnArbiter>,
        resolver: Box<dyn IntentResolver>,
        store: Box<dyn SlotStore>,
    ) -> Result<Self> {
        let terminal = steps
            .last()
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::Config("conversation flow needs at least one step".to_string()))?;
        Ok(Self {
            steps,
            terminal,
            arbiter,
            resolver,
            store,
            phase: FlowPhase::NotStarted,
            slots: IndexMap::new(),
            pending: None,
            active_listen: None,
            generation: 0,
        })
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> &FlowPhase {
        &self.phase
    }

    /// Collected slot values, in collection order
    #[must_use]
    pub const fn slots(&self) -> &IndexMap<String, String> {
        &self.slots
    }

    /// The confirmation round in progress, if any
    #[must_use]
    pub const fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    /// Whether a listen turn opened by this engine is currently active
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.active_listen.is_some()
    }

    /// Generation stamp for transcript staleness checks
    ///
    /// Bumped by [`Self::start`] and [`Self::cancel`]; a transcript produced
    /// under an older generation is discarded by [`Self::on_transcript`].
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Reset to the first step, speak its prompt, and open a listen turn
    ///
    /// The only operation that leaves the `Complete` and `Cancelled` states.
    /// Any listen turn still open from the previous run is closed first, so
    /// the restart prompt does not wait on a device this engine itself holds.
    ///
    /// # Errors
    ///
    /// Returns error if the prompt cannot be spoken or listening cannot start.
    pub async fn start(&mut self) -> Result<()> {
        self.close_listening().await;
        self.generation += 1;
        self.slots.clear();
        self.pending = None;

        let Some(first) = self.steps.first() else {
            return Err(Error::Config("conversation flow has no steps".to_string()));
        };
        let (id, prompt) = (first.id.clone(), first.prompt.clone());
        tracing::info!(step = %id, "conversation flow started");

        self.phase = FlowPhase::AwaitingInput(id);
        self.arbiter.speak(&prompt).await?;
        self.open_listening().await
    }

    /// Close the engine's listen turn and return the recording for transcription
    ///
    /// Returns the generation to pass back into [`Self::on_transcript`] along
    /// with the audio reference, or `None` if nothing was listening (or the
    /// turn was already torn down by cancellation).
    ///
    /// # Errors
    ///
    /// Returns error if finalizing the capture fails.
    pub async fn finish_listening(&mut self) -> Result<Option<(u64, AudioRef)>> {
        let Some(handle) = self.active_listen.take() else {
            return Ok(None);
        };
        match self.arbiter.stop_listening(handle).await {
            Ok(audio) => Ok(Some((self.generation, audio))),
            Err(Error::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Re-open a listen turn for the current step if none is active
    ///
    /// # Errors
    ///
    /// Returns error if listening cannot start, or [`Error::Flow`] if the flow
    /// is not awaiting anything.
    pub async fn reopen_listening(&mut self) -> Result<()> {
        match self.phase {
            FlowPhase::AwaitingInput(_) | FlowPhase::AwaitingConfirmation(_) => {
                self.open_listening().await
            }
            _ => Err(Error::Flow("flow is not awaiting input".to_string())),
        }
    }

    /// Feed a transcript produced under `generation` into the flow
    ///
    /// Stale generations (from a listen turn that predates a cancel/restart)
    /// are discarded without touching any state.
    ///
    /// # Errors
    ///
    /// Returns error if a prompt cannot be spoken, listening cannot re-open,
    /// or terminal persistence fails. Resolver failures are not errors: the
    /// user is re-prompted and the step stays current.
    pub async fn on_transcript(&mut self, generation: u64, text: &str) -> Result<TurnOutcome> {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "stale transcript discarded");
            return Ok(TurnOutcome::Discarded);
        }
        tracing::info!(transcript = text, phase = ?self.phase, "transcript received");

        match self.phase.clone() {
            FlowPhase::AwaitingInput(step) => self.advance(&step, text).await,
            FlowPhase::AwaitingConfirmation(_) => self.resolve_confirmation(text).await,
            _ => {
                tracing::debug!(phase = ?self.phase, "transcript outside an active flow, ignored");
                Ok(TurnOutcome::Discarded)
            }
        }
    }

    /// Commit the pending candidate value and continue
    ///
    /// Usable directly (e.g. a gesture standing in for "yes"): if the
    /// confirmation listen turn is still open it is closed and its recording
    /// discarded before the engine speaks again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flow`] if no confirmation is pending.
    pub async fn confirm_pending(&mut self) -> Result<TurnOutcome> {
        let Some(pending) = self.pending.take() else {
            return Err(Error::Flow("no pending confirmation".to_string()));
        };
        self.close_listening().await;
        let PendingConfirmation {
            step,
            candidate,
            next_step,
            ..
        } = pending;

        let message = if next_step == self.terminal {
            self.prompt_for(&next_step)
                .unwrap_or(COMPLETION_MESSAGE)
                .to_string()
        } else {
            self.prompt_for(&next_step)
                .unwrap_or(CONTINUE_PROMPT)
                .to_string()
        };
        self.commit(&step, candidate, next_step, &message).await
    }

    /// Discard the pending candidate and re-ask the same step
    ///
    /// Leaves collected slots and the current step exactly as they were before
    /// the confirmation round. Like [`Self::confirm_pending`], closes any
    /// listen turn still open from the confirmation question first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flow`] if no confirmation is pending.
    pub async fn reject_pending(&mut self) -> Result<TurnOutcome> {
        let Some(pending) = self.pending.take() else {
            return Err(Error::Flow("no pending confirmation".to_string()));
        };
        self.close_listening().await;
        tracing::debug!(step = %pending.step, "candidate rejected");

        self.phase = FlowPhase::AwaitingInput(pending.step.clone());
        let prompt = self
            .prompt_for(&pending.step)
            .unwrap_or(RETRY_PROMPT)
            .to_string();
        self.arbiter.speak(&prompt).await?;
        self.open_listening().await?;
        Ok(TurnOutcome::Reprompted)
    }

    /// Re-speak the current prompt and re-open listening
    ///
    /// The caller's retry path after a failed or empty transcription. The
    /// engine imposes no retry cap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flow`] if the flow is not awaiting anything, or an
    /// audio error from the arbiter.
    pub async fn reprompt(&mut self) -> Result<TurnOutcome> {
        let prompt = match &self.phase {
            FlowPhase::AwaitingInput(step) => self
                .prompt_for(step)
                .map_or_else(|| RETRY_PROMPT.to_string(), |p| format!("{RETRY_PROMPT} {p}")),
            FlowPhase::AwaitingConfirmation(_) => self
                .pending
                .as_ref()
                .map_or_else(|| CONFIRM_INSTRUCTION.to_string(), |p| p.prompt.clone()),
            _ => return Err(Error::Flow("flow is not awaiting input".to_string())),
        };
        self.close_listening().await;
        self.arbiter.speak(&prompt).await?;
        self.open_listening().await?;
        Ok(TurnOutcome::Reprompted)
    }

    /// Cancel the flow: reset state, invalidate in-flight work, free the device
    ///
    /// Any transcription still in flight when this is called will be discarded
    /// when it arrives (its generation no longer matches).
    pub async fn cancel(&mut self) {
        self.generation += 1;
        self.phase = FlowPhase::Cancelled;
        self.slots.clear();
        self.pending = None;
        self.active_listen = None;
        self.arbiter.interrupt().await;
        tracing::info!("conversation flow cancelled");
    }

    /// Close the engine's own listen turn without transcribing it
    ///
    /// The arbiter cannot speak while this engine holds an open listen turn,
    /// so every path that speaks without first calling
    /// [`Self::finish_listening`] must close the turn here.
    async fn close_listening(&mut self) {
        let Some(handle) = self.active_listen.take() else {
            return;
        };
        match self.arbiter.stop_listening(handle).await {
            Ok(audio) => {
                if let Err(e) = tokio::fs::remove_file(audio.path()).await {
                    tracing::debug!(path = %audio.path().display(), error = %e, "discarded recording not removed");
                }
            }
            // Already torn down by an interrupt
            Err(Error::Interrupted) => {}
            Err(e) => tracing::warn!(error = %e, "failed to close listen turn"),
        }
    }

    async fn open_listening(&mut self) -> Result<()> {
        if self.active_listen.is_some() {
            return Ok(());
        }
        let handle = self.arbiter.listen().await?;
        self.active_listen = Some(handle);
        Ok(())
    }

    fn prompt_for(&self, step: &str) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.id == step)
            .map(|s| s.prompt.as_str())
    }

    fn validates(&self, step: &str, value: &str) -> bool {
        self.steps
            .iter()
            .find(|s| s.id == step)
            .is_none_or(|s| s.accepts(value))
    }

    async fn advance(&mut self, step: &str, text: &str) -> Result<TurnOutcome> {
        let resolution = match self.resolver.resolve(text, step, &self.slots).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(error = %e, step, "intent resolution failed");
                self.arbiter.speak(RETRY_PROMPT).await?;
                self.open_listening().await?;
                return Ok(TurnOutcome::Reprompted);
            }
        };

        match resolution.value {
            Some(value) if self.validates(step, &value) => {
                if resolution.needs_confirmation {
                    let prompt = if resolution.message.is_empty() {
                        CONFIRM_INSTRUCTION.to_string()
                    } else {
                        format!("{} {CONFIRM_INSTRUCTION}", resolution.message)
                    };
                    self.pending = Some(PendingConfirmation {
                        step: step.to_string(),
                        candidate: value,
                        prompt: prompt.clone(),
                        next_step: resolution.step,
                    });
                    self.phase = FlowPhase::AwaitingConfirmation(step.to_string());
                    self.arbiter.speak(&prompt).await?;
                    self.open_listening().await?;
                    Ok(TurnOutcome::AwaitingConfirmation)
                } else {
                    self.commit(step, value, resolution.step, &resolution.message)
                        .await
                }
            }
            Some(value) => {
                tracing::warn!(step, value = %value, "recognized value rejected by validator");
                let prompt = self
                    .prompt_for(step)
                    .map_or_else(|| RETRY_PROMPT.to_string(), |p| format!("{RETRY_PROMPT} {p}"));
                self.arbiter.speak(&prompt).await?;
                self.open_listening().await?;
                Ok(TurnOutcome::Reprompted)
            }
            None => {
                let message = if resolution.message.is_empty() {
                    RETRY_PROMPT
                } else {
                    &resolution.message
                };
                self.arbiter.speak(message).await?;
                self.open_listening().await?;
                Ok(TurnOutcome::Reprompted)
            }
        }
    }

    async fn resolve_confirmation(&mut self, text: &str) -> Result<TurnOutcome> {
        match parse_affirmation(text) {
            Some(true) => self.confirm_pending().await,
            Some(false) => self.reject_pending().await,
            None => {
                let prompt = self
                    .pending
                    .as_ref()
                    .map_or_else(|| CONFIRM_INSTRUCTION.to_string(), |p| p.prompt.clone());
                self.arbiter.speak(&prompt).await?;
                self.open_listening().await?;
                Ok(TurnOutcome::Reprompted)
            }
        }
    }

    async fn commit(
        &mut self,
        step: &str,
        value: String,
        next: String,
        message: &str,
    ) -> Result<TurnOutcome> {
        tracing::info!(step, next = %next, "slot committed");
        self.slots.insert(step.to_string(), value);
        self.pending = None;

        if next == self.terminal {
            self.store.save(&self.slots).await?;
            self.phase = FlowPhase::Complete;
            self.arbiter.speak(message).await?;
            tracing::info!(slots = self.slots.len(), "conversation flow complete");
            Ok(TurnOutcome::Completed)
        } else {
            self.phase = FlowPhase::AwaitingInput(next.clone());
            self.arbiter.speak(message).await?;
            self.open_listening().await?;
            Ok(TurnOutcome::Advanced(next))
        }
    }
}

/// Interpret a confirmation utterance as yes, no, or unclear
#[must_use]
pub fn parse_affirmation(text: &str) -> Option<bool> {
    const NEGATIVE: &[&str] = &["no", "nope", "not", "nahi", "wrong", "incorrect", "galat"];
    const POSITIVE: &[&str] = &[
        "yes", "yeah", "yep", "correct", "confirm", "right", "haan", "ok", "okay", "sahi",
    ];

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| NEGATIVE.contains(w)) {
        Some(false)
    } else if words.iter().any(|w| POSITIVE.contains(w)) {
        Some(true)
    } else {
        None
    }
}

/// The canonical registration flow: phone → otp → upiPin → complete
///
/// Validators match the backend's rules: 10-digit phone, the fixed test OTP,
/// 6-digit UPI PIN.
#[must_use]
pub fn registration_flow() -> Vec<FlowStep> {
    vec![
        FlowStep::new("phone", "Please say your ten digit phone number.")
            .with_validator(|v| v.len() == 10 && v.chars().all(|c| c.is_ascii_digit())),
        FlowStep::new("otp", "Please say the four digit code you received.")
            .with_validator(|v| v == "1111"),
        FlowStep::new("upiPin", "Please say your six digit UPI PIN.")
            .with_validator(|v| v.len() == 6 && v.chars().all(|c| c.is_ascii_digit())),
        FlowStep::new("complete", "Registration complete. Thank you."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmation_parsing() {
        assert_eq!(parse_affirmation("yes"), Some(true));
        assert_eq!(parse_affirmation("Yes, that's correct."), Some(true));
        assert_eq!(parse_affirmation("haan sahi hai"), Some(true));
        assert_eq!(parse_affirmation("no"), Some(false));
        assert_eq!(parse_affirmation("that's not right"), Some(false));
        assert_eq!(parse_affirmation("nahi, galat hai"), Some(false));
        assert_eq!(parse_affirmation("what?"), None);
        assert_eq!(parse_affirmation(""), None);
    }

    #[test]
    fn negatives_win_over_embedded_positives() {
        assert_eq!(parse_affirmation("no, that's not correct"), Some(false));
    }

    #[test]
    fn registration_validators() {
        let steps = registration_flow();

        assert!(steps[0].accepts("9876543210"));
        assert!(!steps[0].accepts("98765"));
        assert!(!steps[0].accepts("98765432ab"));

        assert!(steps[1].accepts("1111"));
        assert!(!steps[1].accepts("1234"));

        assert!(steps[2].accepts("123456"));
        assert!(!steps[2].accepts("12345"));

        // Terminal step has no validator
        assert!(steps[3].accepts("anything"));
    }
}
