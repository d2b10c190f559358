//! Word-level transcription via the AssemblyAI REST API.
//!
//! A transcript is submitted once and then polled until it reaches a
//! terminal state (`completed` or `error`) or the configured wait runs out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{parse_response, request_error, ProviderError};

const PROVIDER: &str = "AssemblyAI";

/// Public AssemblyAI endpoint.
pub const ASSEMBLYAI_BASE_URL: &str = "https://api.assemblyai.com";

/// One transcribed word. Times are milliseconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionWord {
    pub text: String,
    pub start: u64,
    pub end: u64,
    pub confidence: f64,
}

/// Turns a reachable audio locator into timed words.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio at `audio_url`.
    ///
    /// `Ok(None)` means the service finished without word timings.
    async fn transcribe(&self, audio_url: &str) -> Result<Option<Vec<CaptionWord>>, ProviderError>;
}

/// Polling behaviour for [`AssemblyAiClient`].
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Give up after this long.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(240),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    words: Option<Vec<CaptionWord>>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the AssemblyAI transcript endpoints.
#[derive(Debug, Clone)]
pub struct AssemblyAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll: PollConfig,
}

impl AssemblyAiClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self::with_base_url(client, ASSEMBLYAI_BASE_URL.to_string(), api_key, PollConfig::default())
    }

    /// Point the client at a different host and polling schedule.
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        poll: PollConfig,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            poll,
        }
    }

    /// Submit a transcript job. Sends `POST /v2/transcript`.
    async fn submit(&self, audio_url: &str) -> Result<TranscriptResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&json!({ "audio_url": audio_url }))
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        parse_response(PROVIDER, response).await
    }

    /// Fetch the current state of a job. Sends `GET /v2/transcript/{id}`.
    async fn fetch(&self, id: &str) -> Result<TranscriptResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v2/transcript/{}", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        parse_response(PROVIDER, response).await
    }
}

#[async_trait]
impl Transcriber for AssemblyAiClient {
    async fn transcribe(&self, audio_url: &str) -> Result<Option<Vec<CaptionWord>>, ProviderError> {
        let mut transcript = self.submit(audio_url).await?;
        tracing::debug!(transcript_id = %transcript.id, "Submitted transcript");

        let started = tokio::time::Instant::now();
        loop {
            match transcript.status.as_str() {
                "completed" => {
                    tracing::debug!(
                        transcript_id = %transcript.id,
                        words = transcript.words.as_ref().map_or(0, Vec::len),
                        "Transcript completed"
                    );
                    return Ok(transcript.words);
                }
                "error" => {
                    return Err(ProviderError::invalid(
                        PROVIDER,
                        transcript
                            .error
                            .unwrap_or_else(|| "transcription failed".to_string()),
                    ));
                }
                _ => {}
            }

            if started.elapsed() >= self.poll.max_wait {
                return Err(ProviderError::Timeout {
                    provider: PROVIDER,
                    waited_secs: self.poll.max_wait.as_secs(),
                });
            }
            tokio::time::sleep(self.poll.interval).await;
            transcript = self.fetch(&transcript.id).await?;
        }
    }
}
