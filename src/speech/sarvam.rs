//! Sarvam AI speech services (STT and TTS)

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;

use crate::audio::AudioPlayback;
use crate::speech::{AudioRef, SpeechSynthesis, Transcriber, VoiceParams};
use crate::{Error, Result};

/// Response from the Sarvam text-to-speech API
#[derive(serde::Deserialize)]
struct TtsResponse {
    /// Base64-encoded WAV payloads, one per input
    audios: Vec<String>,
}

/// Response from the Sarvam speech-to-text API
#[derive(serde::Deserialize)]
struct SttResponse {
    transcript: String,
}

/// Client for Sarvam AI speech endpoints
pub struct SarvamClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    stt_model: String,
    tts_model: String,
}

impl SarvamClient {
    /// Create a new Sarvam client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        api_key: String,
        base_url: String,
        stt_model: String,
        tts_model: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Sarvam API key required (set FINSEE_API_KEY)".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            stt_model,
            tts_model,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (WAV format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            inputs: [&'a str; 1],
            target_language_code: &'a str,
            speaker: &'a str,
            pitch: f32,
            pace: f32,
            loudness: f32,
            speech_sample_rate: u32,
            enable_preprocessing: bool,
            model: &'a str,
        }

        let request = TtsRequest {
            inputs: [text],
            target_language_code: &params.language,
            speaker: &params.speaker,
            pitch: 0.0,
            pace: params.pace,
            loudness: params.loudness,
            speech_sample_rate: params.sample_rate,
            enable_preprocessing: true,
            model: &self.tts_model,
        };

        let response = self
            .client
            .post(format!("{}/text-to-speech", self.base_url))
            .header("api-subscription-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Sarvam TTS request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Sarvam TTS API error");
            return Err(Error::Tts(format!("Sarvam TTS error {status}: {body}")));
        }

        let result: TtsResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Sarvam TTS response");
            e
        })?;

        let encoded = result
            .audios
            .first()
            .ok_or_else(|| Error::Tts("Sarvam TTS returned no audio".to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Tts(format!("invalid base64 audio: {e}")))?;

        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio)
    }
}

#[async_trait]
impl Transcriber for SarvamClient {
    async fn transcribe(&self, audio: &AudioRef, language_hint: &str) -> Result<String> {
        let bytes = tokio::fs::read(audio.path()).await?;
        tracing::debug!(audio_bytes = bytes.len(), "starting Sarvam transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.stt_model.clone())
            .text("language_code", language_hint.to_string())
            .text("domain", "finance");

        let response = self
            .client
            .post(format!("{}/speech-to-text", self.base_url))
            .header("api-subscription-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Sarvam STT request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Sarvam STT API error");
            return Err(Error::Stt(format!("Sarvam STT error {status}: {body}")));
        }

        let result: SttResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Sarvam STT response");
            e
        })?;

        tracing::info!(transcript = %result.transcript, "transcription complete");
        Ok(result.transcript)
    }
}

/// Speech synthesis collaborator backed by Sarvam TTS and local playback
pub struct SarvamSynthesis {
    client: Arc<SarvamClient>,
    playback: AudioPlayback,
}

impl SarvamSynthesis {
    /// Wrap a Sarvam client with a local playback sink
    #[must_use]
    pub fn new(client: Arc<SarvamClient>, playback: AudioPlayback) -> Self {
        Self { client, playback }
    }
}

#[async_trait]
impl SpeechSynthesis for SarvamSynthesis {
    async fn play(&self, text: &str, params: &VoiceParams) -> Result<()> {
        let audio = self.client.synthesize(text, params).await?;
        self.playback.play_wav(&audio).await
    }

    async fn stop(&self) {
        self.playback.stop();
    }

    fn name(&self) -> &'static str {
        "sarvam"
    }
}
