//! Speech collaborator interfaces
//!
//! The voice layer never talks to speech hardware or remote speech services
//! directly; it goes through these seams. The audio turn arbiter owns the
//! synthesis and capture collaborators, the session owns the transcriber.

pub mod intent;
pub mod sarvam;

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;

/// Sample rate for voice capture (16 kHz mono for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Reference to a recorded audio asset, handed downstream for transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRef(pub PathBuf);

impl AudioRef {
    /// Path of the underlying audio file
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.0
    }
}

/// Opaque identifier for one in-flight recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingHandle(Uuid);

impl RecordingHandle {
    /// Allocate a fresh handle; called by capture implementations
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordingHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Voice rendering parameters passed to the synthesis collaborator
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Speaker/voice identifier
    pub speaker: String,
    /// BCP-47 language code (e.g. "en-IN")
    pub language: String,
    /// Speaking pace multiplier
    pub pace: f32,
    /// Loudness multiplier
    pub loudness: f32,
    /// Synthesis output sample rate
    pub sample_rate: u32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speaker: "vidya".to_string(),
            language: "en-IN".to_string(),
            pace: 0.9,
            loudness: 1.5,
            sample_rate: 22_050,
        }
    }
}

/// Capture format for voice recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Speech synthesis collaborator: renders text and plays it on the speaker
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Render `text` and play it, resolving once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn play(&self, text: &str, params: &VoiceParams) -> Result<()>;

    /// Stop any in-flight playback and release the underlying sink
    async fn stop(&self);

    /// Collaborator name for logging
    fn name(&self) -> &'static str;
}

/// Speech capture collaborator: records from the microphone
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Start recording in the given format
    ///
    /// # Errors
    ///
    /// Returns error if the recording device cannot be started
    async fn start(&self, format: CaptureFormat) -> Result<RecordingHandle>;

    /// Finalize the recording and return a reference to the captured audio
    ///
    /// # Errors
    ///
    /// Returns error if the handle is unknown or finalization fails
    async fn stop(&self, handle: RecordingHandle) -> Result<AudioRef>;

    /// Collaborator name for logging
    fn name(&self) -> &'static str;
}

/// Transcription collaborator: converts recorded audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the referenced audio
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails; callers re-prompt, they do not
    /// retry silently
    async fn transcribe(&self, audio: &AudioRef, language_hint: &str) -> Result<String>;
}

#[async_trait]
impl<T> Transcriber for std::sync::Arc<T>
where
    T: Transcriber + ?Sized,
{
    async fn transcribe(&self, audio: &AudioRef, language_hint: &str) -> Result<String> {
        (**self).transcribe(audio, language_hint).await
    }
}
