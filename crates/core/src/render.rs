//! The video assembly pipeline.
//!
//! [`RenderPipeline::render`] turns one audio track and an ordered list of
//! still images into a single MP4:
//!
//! 1. open an isolated session workspace
//! 2. resolve and write the audio (any failure is fatal)
//! 3. resolve and write the images concurrently, skipping failures while
//!    keeping input order
//! 4. plan the timeline and write the concat manifest
//! 5. encode
//! 6. read the artifact back
//!
//! The session is closed on every exit path. Teardown problems are logged and
//! never change the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::Instrument;

use crate::asset::{AssetError, AssetRef, AssetResolver};
use crate::ffmpeg::{EncodeError, EncodeJob, VideoEncoder};
use crate::request::RenderRequest;
use crate::timeline;
use crate::workspace::{MaterializedAsset, Session, WorkspaceManager};

/// MIME type of every artifact this pipeline produces.
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Concat manifest file name inside a session.
pub const MANIFEST_FILE_NAME: &str = "filelist.txt";

/// Encoded output file name inside a session.
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

/// Default number of images fetched at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Fatal render failures. Per-image resolution failures never appear here.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to resolve audio: {0}")]
    Audio(#[source] AssetError),

    #[error("No images were processed successfully")]
    NoUsableImages,

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Workspace I/O error: {0}")]
    Workspace(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// The finished video, held fully in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub size_bytes: u64,
}

/// Load a finished artifact from disk.
pub async fn pack(artifact_path: &Path) -> Result<RenderArtifact, RenderError> {
    let bytes = tokio::fs::read(artifact_path).await?;
    let size_bytes = bytes.len() as u64;
    Ok(RenderArtifact {
        bytes,
        mime_type: VIDEO_MIME_TYPE,
        size_bytes,
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Renders videos. Immutable and shareable across concurrent requests.
#[derive(Clone)]
pub struct RenderPipeline {
    resolver: AssetResolver,
    workspace: WorkspaceManager,
    encoder: Arc<dyn VideoEncoder>,
    fetch_concurrency: usize,
}

impl RenderPipeline {
    pub fn new(
        resolver: AssetResolver,
        workspace: WorkspaceManager,
        encoder: Arc<dyn VideoEncoder>,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            workspace,
            encoder,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    /// Render `request`, logging encode progress in 10% steps.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderArtifact, RenderError> {
        let (progress_tx, _) = watch::channel(0.0);
        self.render_with_progress(request, progress_tx).await
    }

    /// Render `request`, publishing the encode completion fraction on
    /// `progress`. Progress is also logged in 10% steps.
    pub async fn render_with_progress(
        &self,
        request: &RenderRequest,
        progress: watch::Sender<f64>,
    ) -> Result<RenderArtifact, RenderError> {
        let mut session = self.workspace.open_session().await?;
        let span = tracing::info_span!("render", session_id = %session.id());
        tokio::spawn(log_progress(progress.subscribe()).instrument(span.clone()));

        let result = self
            .render_in_session(&session, request, progress)
            .instrument(span.clone())
            .await;

        session.close().instrument(span.clone()).await;

        if let Err(e) = &result {
            span.in_scope(|| tracing::error!(error = %e, "Render failed"));
        }
        result
    }

    async fn render_in_session(
        &self,
        session: &Session,
        request: &RenderRequest,
        progress: watch::Sender<f64>,
    ) -> Result<RenderArtifact, RenderError> {
        tracing::info!(
            images = request.images().len(),
            duration_secs = request.duration_secs(),
            "Starting render"
        );

        let audio = self.materialize_audio(session, request.audio()).await?;
        tracing::debug!(path = %audio.path.display(), "Materialized audio");

        let images = self.materialize_images(session, request.images()).await;
        if images.is_empty() {
            return Err(RenderError::NoUsableImages);
        }
        tracing::info!(
            resolved = images.len(),
            requested = request.images().len(),
            "Materialized images"
        );

        let image_paths: Vec<PathBuf> = images.into_iter().map(|a| a.path).collect();
        let timeline = timeline::plan(&image_paths, request.duration_secs())?;
        let manifest_path = session
            .materialize(timeline.to_concat_manifest().as_bytes(), MANIFEST_FILE_NAME)
            .await?;
        tracing::debug!(
            entries = timeline.entries().len(),
            total_secs = timeline.total_secs(),
            "Wrote concat manifest"
        );

        let job = EncodeJob {
            manifest_path,
            audio_path: audio.path,
            output_path: session.path_for(OUTPUT_FILE_NAME)?,
            expected_secs: timeline.total_secs(),
        };
        self.encoder.encode(&job, progress).await?;

        let artifact = pack(&job.output_path).await?;
        tracing::info!(size_bytes = artifact.size_bytes, "Render complete");
        Ok(artifact)
    }

    async fn materialize_audio(
        &self,
        session: &Session,
        audio: &AssetRef,
    ) -> Result<MaterializedAsset, RenderError> {
        let bytes = self
            .resolver
            .resolve(audio)
            .await
            .map_err(RenderError::Audio)?;
        let name = format!("audio.{}", audio.file_extension("mp3"));
        let path = session.materialize(&bytes, &name).await?;
        Ok(MaterializedAsset {
            ordinal: None,
            path,
        })
    }

    /// Resolve every image with bounded concurrency. `buffered` yields in
    /// input order, so the result is sorted by ordinal. The futures are
    /// built up front: a stream `map` over borrowed assets would make the
    /// render future non-`Send`.
    async fn materialize_images(
        &self,
        session: &Session,
        images: &[AssetRef],
    ) -> Vec<MaterializedAsset> {
        let pending: Vec<_> = images
            .iter()
            .enumerate()
            .map(|(ordinal, asset)| self.materialize_image(session, ordinal, asset))
            .collect();
        futures::stream::iter(pending)
            .buffered(self.fetch_concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await
    }

    async fn materialize_image(
        &self,
        session: &Session,
        ordinal: usize,
        asset: &AssetRef,
    ) -> Option<MaterializedAsset> {
        let bytes = match self.resolver.resolve(asset).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    ordinal,
                    asset = %asset.describe(),
                    error = %e,
                    "Skipping image that failed to resolve"
                );
                return None;
            }
        };

        let name = format!("image_{ordinal:03}.{}", asset.file_extension("png"));
        match session.materialize(&bytes, &name).await {
            Ok(path) => Some(MaterializedAsset {
                ordinal: Some(ordinal),
                path,
            }),
            Err(e) => {
                tracing::warn!(ordinal, error = %e, "Skipping image that could not be written");
                None
            }
        }
    }
}

/// Log encode progress each time it crosses a 10% step.
async fn log_progress(mut progress: watch::Receiver<f64>) {
    let mut last_step = 0u32;
    while progress.changed().await.is_ok() {
        let step = (*progress.borrow_and_update() * 10.0).floor() as u32;
        if step > last_step {
            last_step = step;
            tracing::info!(percent = step * 10, "Encoding progress");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::asset::ResolverConfig;
    use crate::test_support::serve;

    const FAKE_VIDEO: &[u8] = b"fake mp4 bytes";
    const PNG_A: &str = "data:image/png;base64,QQ==";
    const PNG_B: &str = "data:image/png;base64,Qg==";
    const PNG_C: &str = "data:image/png;base64,Qw==";
    const AUDIO: &str = "data:audio/mpeg;base64,AAEC";

    /// Records what it was asked to encode and writes a fixed artifact.
    #[derive(Default)]
    struct RecordingEncoder {
        calls: AtomicUsize,
        manifests: Mutex<Vec<String>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl VideoEncoder for RecordingEncoder {
        async fn encode(
            &self,
            job: &EncodeJob,
            progress: watch::Sender<f64>,
        ) -> Result<(), EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let manifest = tokio::fs::read_to_string(&job.manifest_path).await?;
            self.manifests.lock().unwrap().push(manifest);
            assert!(job.audio_path.exists());

            if let Some(stderr) = &self.fail_with {
                return Err(EncodeError::Failed {
                    exit_code: Some(1),
                    stderr: stderr.clone(),
                });
            }
            progress.send_replace(1.0);
            tokio::fs::write(&job.output_path, FAKE_VIDEO).await?;
            Ok(())
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        encoder: Arc<RecordingEncoder>,
        pipeline: RenderPipeline,
    }

    fn fixture(encoder: RecordingEncoder) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("renders");
        let encoder = Arc::new(encoder);
        let resolver = AssetResolver::new(&ResolverConfig {
            fetch_timeout: Duration::from_secs(5),
            max_asset_bytes: 1024 * 1024,
        })
        .unwrap();
        let pipeline = RenderPipeline::new(
            resolver,
            WorkspaceManager::new(&root),
            encoder.clone(),
            4,
        );
        Fixture {
            _tmp: tmp,
            root,
            encoder,
            pipeline,
        }
    }

    fn request(audio: &str, images: &[&str], duration: f64) -> RenderRequest {
        let images: Vec<String> = images.iter().map(|s| s.to_string()).collect();
        RenderRequest::new(audio, &images, duration).unwrap()
    }

    fn assert_workspace_empty(root: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(root)
            .map(|entries| entries.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "leftover session files: {leftovers:?}");
    }

    /// `(file name, duration)` pairs parsed back out of a concat manifest.
    fn manifest_entries(manifest: &str) -> Vec<(String, Option<String>)> {
        let mut entries: Vec<(String, Option<String>)> = Vec::new();
        for line in manifest.lines() {
            if let Some(file) = line.strip_prefix("file '") {
                let path = file.trim_end_matches('\'');
                let name = Path::new(path).file_name().unwrap().to_string_lossy().into_owned();
                entries.push((name, None));
            } else if let Some(d) = line.strip_prefix("duration ") {
                entries.last_mut().unwrap().1 = Some(d.to_string());
            }
        }
        entries
    }

    #[tokio::test]
    async fn renders_three_images_evenly() {
        let fx = fixture(RecordingEncoder::default());

        let artifact = fx
            .pipeline
            .render(&request(AUDIO, &[PNG_A, PNG_B, PNG_C], 9.0))
            .await
            .unwrap();

        assert_eq!(artifact.bytes, FAKE_VIDEO);
        assert_eq!(artifact.size_bytes, FAKE_VIDEO.len() as u64);
        assert_eq!(artifact.mime_type, "video/mp4");

        let manifests = fx.encoder.manifests.lock().unwrap();
        assert_eq!(
            manifest_entries(&manifests[0]),
            vec![
                ("image_000.png".to_string(), Some("3.000".to_string())),
                ("image_001.png".to_string(), Some("3.000".to_string())),
                ("image_002.png".to_string(), Some("3.000".to_string())),
                ("image_002.png".to_string(), None),
            ]
        );
        assert_workspace_empty(&fx.root);
    }

    #[tokio::test]
    async fn failed_image_is_skipped() {
        let fx = fixture(RecordingEncoder::default());

        fx.pipeline
            .render(&request(AUDIO, &[PNG_A, "data:image/png;base64,@@@"], 10.0))
            .await
            .unwrap();

        let manifests = fx.encoder.manifests.lock().unwrap();
        assert_eq!(
            manifest_entries(&manifests[0]),
            vec![
                ("image_000.png".to_string(), Some("10.000".to_string())),
                ("image_000.png".to_string(), None),
            ]
        );
        assert_workspace_empty(&fx.root);
    }

    #[tokio::test]
    async fn remote_images_keep_input_order_and_tolerate_failures() {
        let base = serve(
            Router::new()
                .route(
                    "/slow.png",
                    get(|| async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        vec![1u8]
                    }),
                )
                .route("/fast.jpg", get(|| async { vec![2u8] }))
                .route("/gone.png", get(|| async { StatusCode::NOT_FOUND })),
        )
        .await;
        let fx = fixture(RecordingEncoder::default());

        let slow = format!("{base}/slow.png");
        let gone = format!("{base}/gone.png");
        let fast = format!("{base}/fast.jpg");
        fx.pipeline
            .render(&request(AUDIO, &[&slow, &gone, &fast], 4.0))
            .await
            .unwrap();

        let manifests = fx.encoder.manifests.lock().unwrap();
        assert_eq!(
            manifest_entries(&manifests[0]),
            vec![
                ("image_000.png".to_string(), Some("2.000".to_string())),
                ("image_002.jpg".to_string(), Some("2.000".to_string())),
                ("image_002.jpg".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn audio_failure_is_fatal_before_encoding() {
        let fx = fixture(RecordingEncoder::default());

        let result = fx
            .pipeline
            .render(&request("data:audio/mpeg;base64,", &[PNG_A], 5.0))
            .await;

        assert_matches!(result, Err(RenderError::Audio(AssetError::MalformedInline(_))));
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
        assert_workspace_empty(&fx.root);
    }

    #[tokio::test]
    async fn remote_audio_failure_is_fatal() {
        let base = serve(Router::new()).await;
        let fx = fixture(RecordingEncoder::default());

        let result = fx
            .pipeline
            .render(&request(&format!("{base}/missing.mp3"), &[PNG_A], 5.0))
            .await;

        assert_matches!(result, Err(RenderError::Audio(AssetError::FetchFailed { .. })));
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_images_failing_is_no_usable_images() {
        let fx = fixture(RecordingEncoder::default());

        let result = fx
            .pipeline
            .render(&request(AUDIO, &["data:image/png;base64,@", "data:text/plain,x"], 5.0))
            .await;

        assert_matches!(result, Err(RenderError::NoUsableImages));
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
        assert_workspace_empty(&fx.root);
    }

    #[tokio::test]
    async fn encoder_failure_surfaces_diagnostics_and_cleans_up() {
        let fx = fixture(RecordingEncoder {
            fail_with: Some("Invalid data found when processing input".into()),
            ..RecordingEncoder::default()
        });

        let result = fx.pipeline.render(&request(AUDIO, &[PNG_A], 2.0)).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid data found"));
        assert_matches!(err, RenderError::Encode(EncodeError::Failed { .. }));
        assert_workspace_empty(&fx.root);
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        let fx = fixture(RecordingEncoder::default());
        let (tx, rx) = watch::channel(0.0);

        fx.pipeline
            .render_with_progress(&request(AUDIO, &[PNG_A], 1.0), tx)
            .await
            .unwrap();

        assert_eq!(*rx.borrow(), 1.0);
    }

    /// Never finishes; stands in for an encode cut off by a request timeout.
    struct StalledEncoder;

    #[async_trait]
    impl VideoEncoder for StalledEncoder {
        async fn encode(
            &self,
            _job: &EncodeJob,
            progress: watch::Sender<f64>,
        ) -> Result<(), EncodeError> {
            progress.send_replace(0.3);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn render_future_is_send() {
        let fx = fixture(RecordingEncoder::default());
        let request = request(AUDIO, &[PNG_A, PNG_B], 2.0);

        let render = fx.pipeline.render(&request);

        assert_send(&render);
    }

    #[tokio::test]
    async fn cancelled_render_removes_session() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("renders");
        let resolver = AssetResolver::new(&ResolverConfig::default()).unwrap();
        let pipeline = RenderPipeline::new(
            resolver,
            WorkspaceManager::new(&root),
            Arc::new(StalledEncoder),
            4,
        );

        let result = tokio::time::timeout(
            Duration::from_millis(200),
            pipeline.render(&request(AUDIO, &[PNG_A, PNG_B], 4.0)),
        )
        .await;

        assert!(result.is_err(), "render should have timed out");
        assert!(root.is_dir());
        assert_workspace_empty(&root);
    }

    /// Log sink shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn progress_logs_carry_session_id() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = fixture(RecordingEncoder::default());
        fx.pipeline
            .render(&request(AUDIO, &[PNG_A], 1.0))
            .await
            .unwrap();

        // The logger runs as its own task; let it drain the final value.
        for _ in 0..50 {
            if logs.text().contains("Encoding progress") {
                break;
            }
            tokio::task::yield_now().await;
        }

        let text = logs.text();
        let line = text
            .lines()
            .find(|l| l.contains("Encoding progress"))
            .unwrap_or_else(|| panic!("no progress line in:\n{text}"));
        assert!(line.contains("session_id="), "{line}");
        assert!(line.contains("percent=100"), "{line}");
    }

    #[tokio::test]
    async fn pack_reads_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("output.mp4");
        std::fs::write(&path, vec![9u8; 4096]).unwrap();

        let artifact = pack(&path).await.unwrap();

        assert_eq!(artifact.size_bytes, 4096);
        assert_eq!(artifact.bytes.len(), 4096);
    }

    #[tokio::test]
    async fn pack_missing_file_is_workspace_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert_matches!(
            pack(&tmp.path().join("nope.mp4")).await,
            Err(RenderError::Workspace(_))
        );
    }
}
