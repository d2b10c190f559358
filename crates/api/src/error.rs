use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reelsmith_core::error::CoreError;
use reelsmith_core::render::RenderError;
use reelsmith_providers::ProviderError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of the core and provider crates and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `reelsmith_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failed video render.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A failed call to an external service.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The account store rejected a read or write.
    #[error("Account store error: {0}")]
    Store(#[source] ProviderError),

    /// An external service answered with content we could not use.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A generation request completed without producing anything.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Render errors ---
            AppError::Render(render) => match render {
                RenderError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                RenderError::Workspace(err) => {
                    tracing::error!(error = %err, "Render workspace error");
                    internal()
                }
                other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RENDER_FAILED",
                    other.to_string(),
                ),
            },

            // --- Upstream services ---
            AppError::Provider(err) => {
                tracing::warn!(error = %err, "Upstream provider error");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
            }
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Unusable upstream response");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Generation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_FAILED",
                msg.clone(),
            ),

            // --- Account store ---
            AppError::Store(err) => {
                tracing::error!(error = %err, "Account store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Sanitized 500 response parts.
fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
