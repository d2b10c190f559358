use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use reelsmith_core::request::require_text;
use reelsmith_providers::CaptionWord;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCaptionsRequest {
    pub audio_file_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateCaptionsResponse {
    pub captions: Vec<CaptionWord>,
}

/// POST /generate-captions
///
/// Blocks until the transcription service finishes.
pub async fn generate_captions(
    State(state): State<AppState>,
    body: Result<Json<GenerateCaptionsRequest>, JsonRejection>,
) -> AppResult<Json<GenerateCaptionsResponse>> {
    let Json(body) = body?;
    let audio_url = require_text("audioFileUrl", body.audio_file_url.as_deref())?;

    let captions = state
        .transcriber()?
        .transcribe(audio_url)
        .await?
        .ok_or_else(|| AppError::Generation("No captions generated".into()))?;

    tracing::info!(words = captions.len(), "Generated captions");
    Ok(Json(GenerateCaptionsResponse { captions }))
}
