//! Handler for slideshow video rendering.
//!
//! Validates the request, runs the render pipeline, and returns the finished
//! MP4 inline as base64.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use base64::Engine;
use reelsmith_core::error::CoreError;
use reelsmith_core::request::RenderRequest;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

/// Body of `POST /api/render-video`. Fields are optional so missing ones
/// surface as validation errors naming the field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoRequest {
    pub audio_url: Option<String>,
    pub images: Option<Vec<String>>,
    /// Total length in seconds.
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoResponse {
    /// Base64-encoded MP4.
    pub video: String,
    pub content_type: &'static str,
    /// Size of the decoded video in bytes.
    pub size: u64,
}

// ---------------------------------------------------------------------------
// POST /render-video
// ---------------------------------------------------------------------------

pub async fn render_video(
    State(state): State<AppState>,
    body: Result<Json<RenderVideoRequest>, JsonRejection>,
) -> AppResult<Json<RenderVideoResponse>> {
    let Json(body) = body?;

    let images = body
        .images
        .ok_or_else(|| CoreError::Validation("Missing images".into()))?;
    let duration = body
        .duration
        .ok_or_else(|| CoreError::Validation("Missing duration".into()))?;
    let request = RenderRequest::new(body.audio_url.as_deref().unwrap_or_default(), &images, duration)?;

    let artifact = state.renderer.render(&request).await?;

    Ok(Json(RenderVideoResponse {
        video: base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
        content_type: artifact.mime_type,
        size: artifact.size_bytes,
    }))
}
