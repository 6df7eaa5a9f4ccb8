//! Error types for the Finsee voice layer

use thiserror::Error;

/// Result type alias for voice-layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (device missing, stream setup failed)
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech synthesis or capture hardware/permission failure,
    /// surfaced by the audio turn arbiter after it has reset itself to idle
    #[error("speech device error: {0}")]
    SpeechDevice(String),

    /// Speech-to-text failure (remote call failed or returned garbage)
    #[error("transcription error: {0}")]
    Stt(String),

    /// Text-to-speech failure
    #[error("synthesis error: {0}")]
    Tts(String),

    /// Intent resolution failure (backend error or malformed response)
    #[error("intent resolution error: {0}")]
    Intent(String),

    /// Recognized value rejected by a step validator
    #[error("validation rejected: {0}")]
    Validation(String),

    /// Conversation flow misuse (e.g. confirming with nothing pending)
    #[error("flow error: {0}")]
    Flow(String),

    /// A listen handle was invalidated by cancellation before it was closed
    #[error("audio turn interrupted")]
    Interrupted,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
