//! Script generation prompt shaping and response cleanup.

/// Instruction prepended to every user prompt sent to the script model.
pub const SCRIPT_PREAMBLE: &str =
    "You are a Video Script Writer and AI Image Prompt Engineer. You do all the tasks with sincerity.";

/// Full prompt for the script model.
pub fn build_script_prompt(user_prompt: &str) -> String {
    format!("{SCRIPT_PREAMBLE}\n\n{user_prompt}")
}

/// Remove a surrounding markdown code fence (```` ```json ```` or bare
/// ```` ``` ````) from model output.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    let body = body.trim_start();
    body.strip_suffix("```").unwrap_or(body).trim_end()
}

/// Parse model output as a JSON script document.
pub fn parse_script(text: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(strip_code_fences(text))
}
