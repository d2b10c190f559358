use std::path::PathBuf;
use std::str::FromStr;

use reelsmith_core::ffmpeg::Resolution;
use reelsmith_providers::speech::DEFAULT_VOICE_ID;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    /// A single `*` mirrors the request origin.
    pub cors_origins: Vec<String>,
    /// Timeout for the proxy routes in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Timeout for rendering and transcription in seconds (default: `300`).
    pub render_timeout_secs: u64,
    /// Largest accepted request body (default: 100 MiB).
    pub max_body_bytes: usize,
    /// Video assembly settings.
    pub render: RenderConfig,
    /// Credentials for the proxied services.
    pub providers: ProviderConfig,
}

/// Settings for the render pipeline.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub ffmpeg_path: PathBuf,
    /// Parent directory of per-request session workspaces.
    pub workspace_dir: PathBuf,
    /// Letterbox target; `None` keeps source frame sizes.
    pub resolution: Option<Resolution>,
    pub fps: u32,
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_asset_bytes: u64,
}

/// Provider credentials. Missing keys only fail the routes that need them.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub assemblyai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `*`                     |
    /// | `REQUEST_TIMEOUT_SECS`      | `60`                    |
    /// | `RENDER_TIMEOUT_SECS`       | `300`                   |
    /// | `MAX_BODY_BYTES`            | `104857600`             |
    /// | `FFMPEG_PATH`               | `ffmpeg`                |
    /// | `RENDER_WORKSPACE_DIR`      | OS temp dir             |
    /// | `RENDER_RESOLUTION`         | `1280x1080` (`none`)    |
    /// | `RENDER_FPS`                | `30`                    |
    /// | `RENDER_FETCH_CONCURRENCY`  | `8`                     |
    /// | `RENDER_FETCH_TIMEOUT_SECS` | `60`                    |
    /// | `RENDER_MAX_ASSET_BYTES`    | `52428800`              |
    /// | `ELEVENLABS_API_KEY`        | unset                   |
    /// | `ELEVENLABS_VOICE_ID`       | `Jessica`               |
    /// | `ASSEMBLYAI_API_KEY`        | unset                   |
    /// | `GEMINI_API_KEY`            | unset                   |
    /// | `SUPABASE_URL`              | unset                   |
    /// | `SUPABASE_SERVICE_ROLE_KEY` | unset                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let resolution = match std::env::var("RENDER_RESOLUTION") {
            Ok(v) if v.eq_ignore_ascii_case("none") => None,
            Ok(v) => Some(
                Resolution::parse(&v)
                    .unwrap_or_else(|e| panic!("RENDER_RESOLUTION is invalid: {e}")),
            ),
            Err(_) => Some(Resolution {
                width: 1280,
                height: 1080,
            }),
        };

        let render = RenderConfig {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .unwrap_or_else(|_| "ffmpeg".into())
                .into(),
            workspace_dir: std::env::var("RENDER_WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            resolution,
            fps: parse_var("RENDER_FPS", 30),
            fetch_concurrency: parse_var("RENDER_FETCH_CONCURRENCY", 8),
            fetch_timeout_secs: parse_var("RENDER_FETCH_TIMEOUT_SECS", 60),
            max_asset_bytes: parse_var("RENDER_MAX_ASSET_BYTES", 50 * 1024 * 1024),
        };

        let providers = ProviderConfig {
            elevenlabs_api_key: optional_var("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: optional_var("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            assemblyai_api_key: optional_var("ASSEMBLYAI_API_KEY"),
            gemini_api_key: optional_var("GEMINI_API_KEY"),
            supabase_url: optional_var("SUPABASE_URL"),
            supabase_service_role_key: optional_var("SUPABASE_SERVICE_ROLE_KEY"),
        };

        Self {
            host,
            port: parse_var("PORT", 3000),
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 60),
            render_timeout_secs: parse_var("RENDER_TIMEOUT_SECS", 300),
            max_body_bytes: parse_var("MAX_BODY_BYTES", 100 * 1024 * 1024),
            render,
            providers,
        }
    }
}

/// Parse `name` from the environment, falling back to `default` when unset.
///
/// Panics on a present but malformed value so misconfiguration fails fast.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

/// A set, non-blank environment variable.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
