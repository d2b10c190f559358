//! Text-to-speech via the ElevenLabs REST API.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{ensure_success, request_error, ProviderError};

const PROVIDER: &str = "ElevenLabs";

/// Public ElevenLabs endpoint.
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Voice used when none is configured.
pub const DEFAULT_VOICE_ID: &str = "Jessica";

const MODEL_ID: &str = "eleven_multilingual_v2";

/// MIME type of synthesized audio.
pub const SPEECH_MIME_TYPE: &str = "audio/mpeg";

/// Turns text into spoken audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`, returning MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// HTTP client for the ElevenLabs text-to-speech endpoint.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsClient {
    pub fn new(client: reqwest::Client, api_key: String, voice_id: String) -> Self {
        Self::with_base_url(client, ELEVENLABS_BASE_URL.to_string(), api_key, voice_id)
    }

    /// Point the client at a different host (self-hosted gateway, tests).
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        voice_id: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            voice_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "text": text,
            "model_id": MODEL_ID,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.5,
            },
        });

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id))
            .header(reqwest::header::ACCEPT, SPEECH_MIME_TYPE)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        let response = ensure_success(PROVIDER, response).await?;
        let bytes = response.bytes().await.map_err(request_error(PROVIDER))?;
        tracing::debug!(chars = text.len(), bytes = bytes.len(), "Synthesized speech");
        Ok(bytes.to_vec())
    }
}
