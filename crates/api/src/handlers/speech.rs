use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use base64::Engine;
use reelsmith_core::request::require_text;
use reelsmith_providers::speech::SPEECH_MIME_TYPE;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateAudioRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAudioResponse {
    /// Base64-encoded MP3.
    pub audio: String,
    pub content_type: &'static str,
}

/// POST /generate-audio
pub async fn generate_audio(
    State(state): State<AppState>,
    body: Result<Json<GenerateAudioRequest>, JsonRejection>,
) -> AppResult<Json<GenerateAudioResponse>> {
    let Json(body) = body?;
    let text = require_text("text", body.text.as_deref())?;

    let audio = state.speech()?.synthesize(text).await?;

    Ok(Json(GenerateAudioResponse {
        audio: base64::engine::general_purpose::STANDARD.encode(audio),
        content_type: SPEECH_MIME_TYPE,
    }))
}
