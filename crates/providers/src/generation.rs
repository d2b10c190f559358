//! Text and image generation via the Gemini `generateContent` REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{parse_response, request_error, ProviderError};

const PROVIDER: &str = "Gemini";

/// Public Gemini endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used for script writing.
pub const SCRIPT_MODEL: &str = "gemini-2.5-pro";

/// Model used for image generation.
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// MIME type assumed when the service omits one.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Sampling parameters for text generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGenerationOptions {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

impl TextGenerationOptions {
    /// Settings used for video scripts.
    pub fn script() -> Self {
        Self {
            model: SCRIPT_MODEL.to_string(),
            temperature: 0.5,
            top_p: 0.95,
            max_output_tokens: 8192,
        }
    }
}

/// A generated image as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
}

/// Produces text and images from prompts.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate text for `prompt`, returning the first text part.
    async fn generate_text(
        &self,
        prompt: &str,
        options: &TextGenerationOptions,
    ) -> Result<String, ProviderError>;

    /// Generate one image for `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: Option<String>,
}

impl GenerateContentResponse {
    /// Parts of the first candidate.
    fn into_parts(self) -> Result<Vec<Part>, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "no candidates"))?;
        candidate
            .content
            .map(|c| c.parts)
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "invalid response structure"))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for Gemini models.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self::with_base_url(client, GEMINI_BASE_URL.to_string(), api_key)
    }

    /// Point the client at a different host (proxy, tests).
    pub fn with_base_url(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Sends `POST /v1beta/models/{model}:generateContent`.
    async fn generate_content(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        parse_response(PROVIDER, response).await
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &TextGenerationOptions,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": options.temperature,
                "topP": options.top_p,
                "maxOutputTokens": options.max_output_tokens,
            },
        });

        self.generate_content(&options.model, &body)
            .await?
            .into_parts()?
            .into_iter()
            .find_map(|p| p.text.filter(|t| !t.is_empty()))
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "no text in response"))
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        self.generate_content(IMAGE_MODEL, &body)
            .await?
            .into_parts()?
            .into_iter()
            .filter_map(|p| p.inline_data)
            .find_map(|inline| {
                let data = inline.data.filter(|d| !d.is_empty())?;
                Some(GeneratedImage {
                    data,
                    mime_type: inline
                        .mime_type
                        .unwrap_or_else(|| DEFAULT_IMAGE_MIME_TYPE.to_string()),
                })
            })
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "no image in response"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
