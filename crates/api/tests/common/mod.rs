#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::watch;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use reelsmith_api::config::{ProviderConfig, RenderConfig, ServerConfig};
use reelsmith_api::routes;
use reelsmith_api::state::AppState;
use reelsmith_core::asset::{AssetResolver, ResolverConfig};
use reelsmith_core::ffmpeg::{EncodeError, EncodeJob, EncoderSettings, FfmpegEncoder, VideoEncoder};
use reelsmith_core::render::RenderPipeline;
use reelsmith_core::subscription::SubscriptionStatus;
use reelsmith_core::workspace::WorkspaceManager;
use reelsmith_providers::{
    AccountStore, CaptionWord, ContentGenerator, GeneratedImage, ProviderError,
    SpeechSynthesizer, TextGenerationOptions, Transcriber,
};

/// Bytes every stub render produces.
pub const FAKE_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42";

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults and no provider keys.
pub fn test_config(workspace: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        render_timeout_secs: 30,
        max_body_bytes: 10 * 1024 * 1024,
        render: RenderConfig {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            workspace_dir: workspace.to_path_buf(),
            resolution: None,
            fps: 30,
            fetch_concurrency: 4,
            fetch_timeout_secs: 5,
            max_asset_bytes: 1024 * 1024,
        },
        providers: ProviderConfig::default(),
    }
}

/// Provider stubs to install; `None` leaves the provider unconfigured.
#[derive(Default)]
pub struct Providers {
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub generator: Option<Arc<dyn ContentGenerator>>,
    pub accounts: Option<Arc<dyn AccountStore>>,
}

/// A running test application and the handles tests inspect.
pub struct TestApp {
    pub router: Router,
    pub encoder: Arc<StubEncoder>,
    pub workspace: tempfile::TempDir,
}

impl TestApp {
    pub fn new(providers: Providers) -> Self {
        Self::with_encoder(StubEncoder::default(), providers)
    }

    pub fn with_encoder(encoder: StubEncoder, providers: Providers) -> Self {
        let workspace = tempfile::tempdir().unwrap();
        let config = test_config(workspace.path());
        let encoder = Arc::new(encoder);

        let resolver = AssetResolver::new(&ResolverConfig {
            fetch_timeout: Duration::from_secs(config.render.fetch_timeout_secs),
            max_asset_bytes: config.render.max_asset_bytes,
        })
        .unwrap();
        let renderer = RenderPipeline::new(
            resolver,
            WorkspaceManager::new(workspace.path()),
            encoder.clone(),
            config.render.fetch_concurrency,
        );

        let state = AppState {
            ffmpeg: Arc::new(FfmpegEncoder::new("ffmpeg", EncoderSettings::default()).unwrap()),
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            speech: providers.speech,
            transcriber: providers.transcriber,
            generator: providers.generator,
            accounts: providers.accounts,
        };

        Self {
            router: build_test_app(state),
            encoder,
            workspace,
        }
    }

    /// Files or directories left under the workspace root.
    pub fn workspace_entries(&self) -> usize {
        std::fs::read_dir(self.workspace.path()).unwrap().count()
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeouts, tracing,
/// panic recovery) that production uses.
pub fn build_test_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");
    let api = routes::api_routes(&state.config);

    Router::new()
        .merge(routes::health_router())
        .nest("/api", api)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Encoder that records manifests and writes [`FAKE_VIDEO`].
#[derive(Default)]
pub struct StubEncoder {
    pub calls: AtomicUsize,
    pub manifests: Mutex<Vec<String>>,
    /// Fail every encode with this diagnostic.
    pub fail_with: Option<String>,
}

impl StubEncoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoEncoder for StubEncoder {
    async fn encode(&self, job: &EncodeJob, progress: watch::Sender<f64>) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let manifest = tokio::fs::read_to_string(&job.manifest_path).await?;
        self.manifests.lock().unwrap().push(manifest);
        if let Some(stderr) = &self.fail_with {
            return Err(EncodeError::Failed {
                exit_code: Some(1),
                stderr: stderr.clone(),
            });
        }
        tokio::fs::write(&job.output_path, FAKE_VIDEO).await?;
        progress.send_replace(1.0);
        Ok(())
    }
}

fn stub_failure(reason: &str) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: "Stub",
        reason: reason.to_string(),
    }
}

/// Speech stub echoing the text as audio bytes, or failing when `ok` is false.
pub struct StubSpeech {
    pub ok: bool,
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        if self.ok {
            Ok(text.as_bytes().to_vec())
        } else {
            Err(ProviderError::Api {
                provider: "Stub",
                status: 401,
                body: "invalid api key".into(),
            })
        }
    }
}

/// Transcriber stub returning a fixed result.
pub struct StubTranscriber {
    pub words: Option<Vec<CaptionWord>>,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio_url: &str) -> Result<Option<Vec<CaptionWord>>, ProviderError> {
        Ok(self.words.clone())
    }
}

/// Generator stub. Images encode their prompt; prompts containing `fail`
/// produce an error. Text generation returns `text` or fails when `None`.
#[derive(Default)]
pub struct StubGenerator {
    pub text: Option<String>,
    pub text_prompts: Mutex<Vec<(String, TextGenerationOptions)>>,
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &TextGenerationOptions,
    ) -> Result<String, ProviderError> {
        self.text_prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), options.clone()));
        self.text.clone().ok_or_else(|| stub_failure("no text in response"))
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        if prompt.contains("fail") {
            return Err(stub_failure("no image in response"));
        }
        Ok(GeneratedImage {
            data: format!("img:{prompt}"),
            mime_type: "image/jpeg".into(),
        })
    }
}

/// A stored account row.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<String>,
    pub credits: i64,
}

/// In-memory account store keyed by membership user id.
#[derive(Default)]
pub struct MemoryAccounts {
    pub accounts: Mutex<HashMap<String, Account>>,
    /// Fail every write.
    pub fail_writes: bool,
}

impl MemoryAccounts {
    pub fn with_account(user_id: &str, credits: i64) -> Self {
        let store = Self::default();
        store.accounts.lock().unwrap().insert(
            user_id.to_string(),
            Account {
                status: None,
                plan: None,
                credits,
            },
        );
        store
    }

    pub fn get(&self, user_id: &str) -> Option<Account> {
        self.accounts.lock().unwrap().get(user_id).cloned()
    }

    fn check_writable(&self) -> Result<(), ProviderError> {
        if self.fail_writes {
            return Err(ProviderError::Api {
                provider: "Stub",
                status: 500,
                body: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn set_subscription(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        plan: Option<&str>,
    ) -> Result<(), ProviderError> {
        self.check_writable()?;
        // Like a filtered UPDATE: rows that don't exist are left alone.
        if let Some(account) = self.accounts.lock().unwrap().get_mut(user_id) {
            account.status = Some(status);
            account.plan = plan.map(str::to_string);
        }
        Ok(())
    }

    async fn credits(&self, user_id: &str) -> Result<Option<i64>, ProviderError> {
        Ok(self.get(user_id).map(|a| a.credits))
    }

    async fn set_credits(&self, user_id: &str, credits: i64) -> Result<(), ProviderError> {
        self.check_writable()?;
        if let Some(account) = self.accounts.lock().unwrap().get_mut(user_id) {
            account.credits = credits;
        }
        Ok(())
    }
}
