//! Handlers for prompt-to-image generation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use reelsmith_core::error::CoreError;
use reelsmith_core::request::require_text;
use reelsmith_providers::generation::DEFAULT_IMAGE_MIME_TYPE;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    /// Base64-encoded image.
    pub image: String,
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImagesRequest {
    pub prompts: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImagesResponse {
    /// One entry per prompt, in order; `""` where generation failed.
    pub images: Vec<String>,
    pub content_type: &'static str,
}

// ---------------------------------------------------------------------------
// POST /generate-image
// ---------------------------------------------------------------------------

pub async fn generate_image(
    State(state): State<AppState>,
    body: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> AppResult<Json<GenerateImageResponse>> {
    let Json(body) = body?;
    let prompt = require_text("prompt", body.prompt.as_deref())?;

    let image = state.generator()?.generate_image(prompt).await?;

    Ok(Json(GenerateImageResponse {
        image: image.data,
        content_type: image.mime_type,
    }))
}

// ---------------------------------------------------------------------------
// POST /generate-images
// ---------------------------------------------------------------------------

/// Generate one image per prompt, sequentially. A failed prompt yields an
/// empty placeholder instead of failing the batch.
pub async fn generate_images(
    State(state): State<AppState>,
    body: Result<Json<GenerateImagesRequest>, JsonRejection>,
) -> AppResult<Json<GenerateImagesResponse>> {
    let Json(body) = body?;
    let prompts = body
        .prompts
        .ok_or_else(|| CoreError::Validation("Missing or invalid prompts array".into()))?;
    let generator = state.generator()?;

    let mut images = Vec::with_capacity(prompts.len());
    for (index, prompt) in prompts.iter().enumerate() {
        match generator.generate_image(prompt).await {
            Ok(image) => images.push(image.data),
            Err(e) => {
                tracing::warn!(index, error = %e, "Image generation failed; using placeholder");
                images.push(String::new());
            }
        }
    }

    let generated = images.iter().filter(|i| !i.is_empty()).count();
    tracing::info!(requested = prompts.len(), generated, "Generated image batch");

    Ok(Json(GenerateImagesResponse {
        images,
        content_type: DEFAULT_IMAGE_MIME_TYPE,
    }))
}
