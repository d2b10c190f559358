use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

/// Health check at root level (not under `/api`).
pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// Build the `/api` route tree.
///
/// ```text
/// /render-video        POST   slideshow render (render timeout)
/// /generate-captions   POST   word-level transcription (render timeout)
///
/// /generate-audio      POST   text to speech
/// /generate-image      POST   one image from a prompt
/// /generate-images     POST   one image per prompt, placeholders on failure
/// /generate-script     POST   JSON video script from a prompt
/// /whop-webhook        POST   membership events
/// ```
///
/// Rendering and transcription poll or encode for minutes, so they carry the
/// longer render timeout; every other route uses the general request timeout.
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    let long_running = Router::new()
        .route("/render-video", post(handlers::render::render_video))
        .route("/generate-captions", post(handlers::captions::generate_captions))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.render_timeout_secs),
        ));

    let proxy = Router::new()
        .route("/generate-audio", post(handlers::speech::generate_audio))
        .route("/generate-image", post(handlers::images::generate_image))
        .route("/generate-images", post(handlers::images::generate_images))
        .route("/generate-script", post(handlers::script::generate_script))
        .route("/whop-webhook", post(handlers::webhook::handle_webhook))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ));

    Router::new()
        .merge(long_running)
        .merge(proxy)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
}
