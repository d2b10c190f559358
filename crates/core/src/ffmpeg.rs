//! FFmpeg encoder invocation and ffprobe helpers.
//!
//! [`FfmpegEncoder`] turns a concat manifest plus one audio file into an MP4
//! with fixed encoding parameters ([`EncoderSettings`]). The child process is
//! driven by a spawned task that reports its outcome on a oneshot channel;
//! the caller simply awaits [`VideoEncoder::encode`]. Dropping that future
//! aborts the task, and `kill_on_drop` takes the child down with it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio_util::task::AbortOnDropHandle;

use crate::error::CoreError;

/// Stderr kept from one ffmpeg run (last 64 KiB).
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Microseconds per second.
const US_PER_SEC: f64 = 1_000_000.0;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg produced no output at {0}")]
    MissingOutput(String),

    #[error("encoder task ended without reporting a result")]
    Aborted,

    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Output frame size for the scale-and-letterbox step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Parse a resolution string like `"1280x1080"`.
    ///
    /// Both dimensions must be non-zero and even (yuv420p output).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (w, h) = s.split_once('x').ok_or_else(|| {
            CoreError::Validation(format!(
                "Invalid resolution format '{s}': expected WIDTHxHEIGHT"
            ))
        })?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| CoreError::Validation(format!("Invalid width in resolution '{s}'")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| CoreError::Validation(format!("Invalid height in resolution '{s}'")))?;
        let resolution = Self { width, height };
        resolution.validate()?;
        Ok(resolution)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::Validation(format!(
                "Resolution dimensions must be > 0, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(CoreError::Validation(format!(
                "Resolution dimensions must be even for yuv420p output, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Fixed, reproducible encoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub video_codec: String,
    pub preset: String,
    pub tune: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub pixel_format: String,
    pub frame_rate: u32,
    /// Letterbox target. `None` keeps the source frame size.
    pub resolution: Option<Resolution>,
    pub pad_color: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            preset: "medium".into(),
            tune: "stillimage".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            pixel_format: "yuv420p".into(),
            frame_rate: 30,
            resolution: Some(Resolution {
                width: 1280,
                height: 1080,
            }),
            pad_color: "black".into(),
        }
    }
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.frame_rate == 0 {
            return Err(CoreError::Validation("frame rate must be non-zero".into()));
        }
        if let Some(resolution) = &self.resolution {
            resolution.validate()?;
        }
        Ok(())
    }

    /// The `-vf` filter chain, if letterboxing is enabled.
    ///
    /// Scales the source down to fit inside the target while keeping its
    /// aspect ratio, then pads the remaining axis, centering the content.
    pub fn video_filter(&self) -> Option<String> {
        self.resolution.map(|Resolution { width, height }| {
            format!(
                "scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color={}",
                self.pad_color
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Inputs and output of one encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Concat-demuxer manifest describing the image timeline.
    pub manifest_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    /// Timeline length, used to turn encoded time into a completion fraction.
    pub expected_secs: f64,
}

/// Produces a video artifact from a timeline manifest and an audio track.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Run the encode to completion.
    ///
    /// Completion fractions in `[0, 1]` are published on `progress`; the
    /// published value never decreases.
    async fn encode(&self, job: &EncodeJob, progress: watch::Sender<f64>)
        -> Result<(), EncodeError>;
}

/// [`VideoEncoder`] backed by an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, settings: EncoderSettings) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self {
            ffmpeg_path: ffmpeg_path.into(),
            settings,
        })
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Whether the configured binary can be executed.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Full argument list for one encode.
    pub fn build_args(&self, job: &EncodeJob) -> Vec<OsString> {
        let s = &self.settings;
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(job.manifest_path.clone().into_os_string());
        args.push("-i".into());
        args.push(job.audio_path.clone().into_os_string());

        for (flag, value) in [
            ("-c:v", s.video_codec.as_str()),
            ("-preset", s.preset.as_str()),
            ("-tune", s.tune.as_str()),
            ("-c:a", s.audio_codec.as_str()),
            ("-b:a", s.audio_bitrate.as_str()),
            ("-pix_fmt", s.pixel_format.as_str()),
        ] {
            args.push(flag.into());
            args.push(value.into());
        }
        args.push("-r".into());
        args.push(s.frame_rate.to_string().into());

        if let Some(filter) = s.video_filter() {
            args.push("-vf".into());
            args.push(filter.into());
        }

        args.push("-shortest".into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(job.output_path.clone().into_os_string());
        args
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        job: &EncodeJob,
        progress: watch::Sender<f64>,
    ) -> Result<(), EncodeError> {
        let args = self.build_args(job);
        tracing::debug!(
            command = %command_line(&self.ffmpeg_path, &args),
            "Starting ffmpeg"
        );

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: self.ffmpeg_path.display().to_string(),
                source,
            })?;

        let (result_tx, result_rx) = oneshot::channel();
        let expected_secs = job.expected_secs;
        let _task = AbortOnDropHandle::new(tokio::spawn(async move {
            let _ = result_tx.send(drive(child, expected_secs, progress).await);
        }));

        result_rx.await.unwrap_or(Err(EncodeError::Aborted))?;

        let written = tokio::fs::metadata(&job.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(EncodeError::MissingOutput(
                job.output_path.display().to_string(),
            ));
        }
        Ok(())
    }
}

/// Consume the child's progress stream and wait for it to exit.
async fn drive(
    mut child: Child,
    expected_secs: f64,
    progress: watch::Sender<f64>,
) -> Result<(), EncodeError> {
    let stderr_task = tokio::spawn(read_tail(child.stderr.take()));

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(fraction) = parse_progress_line(&line, expected_secs) {
                advance(&progress, fraction);
            }
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(EncodeError::Failed {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    advance(&progress, 1.0);
    Ok(())
}

/// Publish `fraction` only if it moves progress forward.
fn advance(progress: &watch::Sender<f64>, fraction: f64) {
    progress.send_if_modified(|current| {
        if fraction > *current {
            *current = fraction;
            true
        } else {
            false
        }
    });
}

/// Parse one `-progress` key=value line into a completion fraction.
///
/// `out_time_ms` carries microseconds, same as `out_time_us`.
pub fn parse_progress_line(line: &str, expected_secs: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            if expected_secs <= 0.0 {
                return None;
            }
            let micros = value.trim().parse::<i64>().ok()?;
            let secs = micros as f64 / US_PER_SEC;
            Some((secs / expected_secs).clamp(0.0, 1.0))
        }
        "progress" if value.trim() == "end" => Some(1.0),
        _ => None,
    }
}

/// Drain a stream to EOF, keeping only its last [`MAX_STDERR_BYTES`].
async fn read_tail<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut tail = Vec::new();
    let Some(mut h) = handle else {
        return tail;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match h.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > MAX_STDERR_BYTES {
                    let excess = tail.len() - MAX_STDERR_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    tail
}

fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// ffprobe
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe_media(ffprobe_path: &Path, path: &Path) -> Result<FfprobeOutput, EncodeError> {
    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|source| EncodeError::Spawn {
            program: ffprobe_path.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(EncodeError::Failed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| EncodeError::Parse(format!("{e}: {stdout}")))
}

/// Media duration in seconds: format-level first, then the first video stream.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    if let Some(secs) = probe.format.duration.as_deref().and_then(|d| d.parse::<f64>().ok()) {
        return secs;
    }
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
