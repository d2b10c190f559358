use std::sync::Arc;
use std::time::Duration;

use reelsmith_core::asset::{AssetResolver, ResolverConfig};
use reelsmith_core::error::CoreError;
use reelsmith_core::ffmpeg::{EncoderSettings, FfmpegEncoder};
use reelsmith_core::render::RenderPipeline;
use reelsmith_core::workspace::WorkspaceManager;
use reelsmith_providers::{
    AccountStore, AssemblyAiClient, ContentGenerator, ElevenLabsClient, GeminiClient,
    SpeechSynthesizer, SupabaseAccountStore, Transcriber,
};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Video assembly pipeline.
    pub renderer: Arc<RenderPipeline>,
    /// The configured ffmpeg binary, probed by the health check.
    pub ffmpeg: Arc<FfmpegEncoder>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub generator: Option<Arc<dyn ContentGenerator>>,
    pub accounts: Option<Arc<dyn AccountStore>>,
}

/// Failures while wiring the state at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid encoder settings: {0}")]
    Encoder(#[from] CoreError),
}

impl AppState {
    /// Build the render pipeline and every configured provider client.
    pub fn from_config(config: ServerConfig) -> Result<Self, StartupError> {
        let render = &config.render;

        let encoder = Arc::new(FfmpegEncoder::new(
            render.ffmpeg_path.clone(),
            EncoderSettings {
                frame_rate: render.fps,
                resolution: render.resolution,
                ..EncoderSettings::default()
            },
        )?);

        let resolver = AssetResolver::new(&ResolverConfig {
            fetch_timeout: Duration::from_secs(render.fetch_timeout_secs),
            max_asset_bytes: render.max_asset_bytes,
        })?;

        let renderer = RenderPipeline::new(
            resolver,
            WorkspaceManager::new(&render.workspace_dir),
            encoder.clone(),
            render.fetch_concurrency,
        );

        // One pooled client shared by every provider.
        let http = reqwest::Client::new();
        let p = &config.providers;

        let speech = p.elevenlabs_api_key.clone().map(|key| {
            Arc::new(ElevenLabsClient::new(
                http.clone(),
                key,
                p.elevenlabs_voice_id.clone(),
            )) as Arc<dyn SpeechSynthesizer>
        });
        let transcriber = p.assemblyai_api_key.clone().map(|key| {
            Arc::new(AssemblyAiClient::new(http.clone(), key)) as Arc<dyn Transcriber>
        });
        let generator = p.gemini_api_key.clone().map(|key| {
            Arc::new(GeminiClient::new(http.clone(), key)) as Arc<dyn ContentGenerator>
        });
        let accounts = match (&p.supabase_url, &p.supabase_service_role_key) {
            (Some(url), Some(key)) => Some(Arc::new(SupabaseAccountStore::new(
                http.clone(),
                url.clone(),
                key.clone(),
            )) as Arc<dyn AccountStore>),
            _ => None,
        };

        for (name, configured) in [
            ("ELEVENLABS_API_KEY", speech.is_some()),
            ("ASSEMBLYAI_API_KEY", transcriber.is_some()),
            ("GEMINI_API_KEY", generator.is_some()),
            ("SUPABASE_URL/SUPABASE_SERVICE_ROLE_KEY", accounts.is_some()),
        ] {
            if !configured {
                tracing::warn!(variable = name, "Provider not configured; dependent routes will fail");
            }
        }

        Ok(Self {
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            ffmpeg: encoder,
            speech,
            transcriber,
            generator,
            accounts,
        })
    }

    pub fn speech(&self) -> AppResult<&dyn SpeechSynthesizer> {
        require(self.speech.as_deref(), "ELEVENLABS_API_KEY")
    }

    pub fn transcriber(&self) -> AppResult<&dyn Transcriber> {
        require(self.transcriber.as_deref(), "ASSEMBLYAI_API_KEY")
    }

    pub fn generator(&self) -> AppResult<&dyn ContentGenerator> {
        require(self.generator.as_deref(), "GEMINI_API_KEY")
    }

    pub fn accounts(&self) -> AppResult<&dyn AccountStore> {
        require(
            self.accounts.as_deref(),
            "SUPABASE_URL/SUPABASE_SERVICE_ROLE_KEY",
        )
    }
}

fn require<'a, T: ?Sized>(provider: Option<&'a T>, variable: &str) -> AppResult<&'a T> {
    provider.ok_or_else(|| AppError::InternalError(format!("{variable} not configured")))
}
