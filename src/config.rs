//! Configuration management for the Finsee voice layer

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::speech::{CaptureFormat, VoiceParams, CAPTURE_SAMPLE_RATE};
use crate::{Error, Result};

/// Finsee voice layer configuration
///
/// Loaded from a TOML file with every field optional; unset fields take the
/// defaults the backend expects. The Sarvam API key can also come from the
/// `FINSEE_API_KEY` environment variable, which wins over the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Remote service endpoints and credentials
    pub backend: BackendConfig,

    /// Voice rendering and recognition parameters
    pub voice: VoiceConfig,

    /// Gesture window tuning
    pub gesture: GestureConfig,

    /// Data directory override (profile storage)
    pub data_dir: Option<PathBuf>,
}

/// Remote service endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Sarvam AI base URL (STT and TTS)
    pub base_url: String,

    /// Intent resolution backend base URL
    pub intent_url: String,

    /// Sarvam API subscription key
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sarvam.ai".to_string(),
            intent_url: "http://localhost:5000".to_string(),
            api_key: None,
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoiceConfig {
    /// TTS speaker identifier
    pub speaker: String,

    /// BCP-47 language code for both synthesis and transcription
    pub language: String,

    /// TTS pace multiplier
    pub pace: f32,

    /// TTS loudness multiplier
    pub loudness: f32,

    /// TTS output sample rate
    pub sample_rate: u32,

    /// STT model identifier
    pub stt_model: String,

    /// TTS model identifier
    pub tts_model: String,

    /// Microphone capture sample rate
    pub capture_sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            speaker: "vidya".to_string(),
            language: "en-IN".to_string(),
            pace: 0.9,
            loudness: 1.5,
            sample_rate: 22_050,
            stt_model: "saarika:v2".to_string(),
            tts_model: "bulbul:v2".to_string(),
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }
}

impl VoiceConfig {
    /// Rendering parameters for the synthesis collaborator
    #[must_use]
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            speaker: self.speaker.clone(),
            language: self.language.clone(),
            pace: self.pace,
            loudness: self.loudness,
            sample_rate: self.sample_rate,
        }
    }

    /// Capture format for the microphone collaborator
    #[must_use]
    pub const fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.capture_sample_rate,
            channels: 1,
        }
    }
}

/// Gesture window tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GestureConfig {
    /// Window for the triple-tap accessibility toggle, in milliseconds
    pub mode_toggle_window_ms: u64,

    /// Window for the double-tap record toggle, in milliseconds
    pub double_tap_window_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            mode_toggle_window_ms: 1000,
            double_tap_window_ms: 300,
        }
    }
}

impl GestureConfig {
    /// Triple-tap window as a [`std::time::Duration`]
    #[must_use]
    pub const fn mode_toggle_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.mode_toggle_window_ms)
    }

    /// Double-tap window as a [`std::time::Duration`]
    #[must_use]
    pub const fn double_tap_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.double_tap_window_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file, or defaults when `path` is `None`
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given file is missing or fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                let config: Self = toml::from_str(&content)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            None => Self::default(),
        };

        if let Ok(key) = std::env::var("FINSEE_API_KEY") {
            if !key.is_empty() {
                config.backend.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Directory for persisted profile data, creating it if needed
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        let dir = self.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("app", "finsee", "finsee")
                .map_or_else(|| PathBuf::from(".finsee"), |d| d.data_dir().to_path_buf())
        });

        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to create data directory");
        }

        dir
    }
}
