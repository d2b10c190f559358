use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use reelsmith_core::request::require_text;
use reelsmith_core::script;
use reelsmith_providers::TextGenerationOptions;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateScriptRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateScriptResponse {
    /// The script document exactly as the model produced it.
    pub script: serde_json::Value,
}

/// POST /generate-script
pub async fn generate_script(
    State(state): State<AppState>,
    body: Result<Json<GenerateScriptRequest>, JsonRejection>,
) -> AppResult<Json<GenerateScriptResponse>> {
    let Json(body) = body?;
    let prompt = require_text("prompt", body.prompt.as_deref())?;

    let text = state
        .generator()?
        .generate_text(&script::build_script_prompt(prompt), &TextGenerationOptions::script())
        .await?;

    let script = script::parse_script(&text)
        .map_err(|e| AppError::Upstream(format!("Generated script is not valid JSON: {e}")))?;

    Ok(Json(GenerateScriptResponse { script }))
}
