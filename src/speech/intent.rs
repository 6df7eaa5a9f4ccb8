//! HTTP intent resolution backend

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::flow::{IntentResolution, IntentResolver};
use crate::{Error, Result};

/// Envelope wrapping every intent backend response
#[derive(serde::Deserialize)]
struct IntentEnvelope {
    status: String,
    #[serde(default)]
    data: Option<IntentResolution>,
    #[serde(default)]
    message: Option<String>,
}

/// Intent resolver backed by the Finsee backend's voice endpoint
pub struct HttpIntentResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIntentResolver {
    /// Create a resolver pointed at the given backend base URL
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IntentResolver for HttpIntentResolver {
    async fn resolve(
        &self,
        transcript: &str,
        current_step: &str,
        slots: &IndexMap<String, String>,
    ) -> Result<IntentResolution> {
        #[derive(serde::Serialize)]
        struct IntentRequest<'a> {
            transcript: &'a str,
            #[serde(rename = "currentStep")]
            current_step: &'a str,
            #[serde(rename = "formData")]
            form_data: &'a IndexMap<String, String>,
        }

        let request = IntentRequest {
            transcript,
            current_step,
            form_data: slots,
        };
        tracing::debug!(current_step, "resolving intent");

        let response = self
            .client
            .post(format!("{}/process-voice", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "intent request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "intent backend error");
            return Err(Error::Intent(format!(
                "intent backend error {status}: {body}"
            )));
        }

        let envelope: IntentEnvelope = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse intent response");
            e
        })?;

        if envelope.status != "success" {
            return Err(Error::Intent(format!(
                "intent backend rejected request: {}",
                envelope.message.unwrap_or_else(|| envelope.status.clone())
            )));
        }

        envelope
            .data
            .ok_or_else(|| Error::Intent("intent backend returned no data".to_string()))
    }
}
