//! Timeline planning for the image slideshow.
//!
//! The total duration is split evenly across the images on an integer
//! millisecond grid. Each image's hold time is the difference between two
//! rounded cumulative boundaries, so the emitted durations always add up to
//! the rounded total no matter how many images there are.
//!
//! The ffmpeg concat demuxer applies a `duration` directive to the entry it
//! follows, and the last listed file is only shown for its allotted span if
//! it is repeated once more without a duration. [`plan`] therefore appends a
//! terminal entry that repeats the last image.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::render::RenderError;

/// Milliseconds per second.
const MS_PER_SEC: f64 = 1000.0;

/// One line of the visual timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub path: PathBuf,
    /// Hold time in seconds; `None` only for the terminal entry.
    pub display_secs: Option<f64>,
}

/// Ordered, duration-annotated image sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of timed (non-terminal) entries.
    pub fn image_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    /// Sum of all timed entries, in seconds.
    pub fn total_secs(&self) -> f64 {
        self.entries.iter().filter_map(|e| e.display_secs).sum()
    }

    /// Render the timeline in ffmpeg concat-demuxer syntax.
    pub fn to_concat_manifest(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "file '{}'", escape_concat_path(&entry.path));
            if let Some(secs) = entry.display_secs {
                let _ = writeln!(out, "duration {secs:.3}");
            }
        }
        out
    }
}

/// Plan the timeline for `image_paths` spread over `total_secs`.
pub fn plan(image_paths: &[PathBuf], total_secs: f64) -> Result<Timeline, RenderError> {
    let Some(last) = image_paths.last() else {
        return Err(RenderError::NoUsableImages);
    };
    if !total_secs.is_finite() || total_secs <= 0.0 {
        return Err(RenderError::Validation(format!(
            "duration must be a positive number of seconds, got {total_secs}"
        )));
    }

    let count = image_paths.len() as u64;
    let total_ms = (total_secs * MS_PER_SEC).round() as u64;
    if total_ms < count {
        return Err(RenderError::Validation(format!(
            "duration {total_secs}s is too short for {count} images"
        )));
    }

    let boundary = |i: u64| -> u64 { ((total_ms as f64) * (i as f64) / (count as f64)).round() as u64 };

    let mut entries: Vec<TimelineEntry> = image_paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let i = i as u64;
            let hold_ms = boundary(i + 1) - boundary(i);
            TimelineEntry {
                path: path.clone(),
                display_secs: Some(hold_ms as f64 / MS_PER_SEC),
            }
        })
        .collect();

    entries.push(TimelineEntry {
        path: last.clone(),
        display_secs: None,
    });

    Ok(Timeline { entries })
}

/// Quote a path for a concat `file` directive.
///
/// Separators are normalized to `/`; a single quote closes the quoted
/// string, emits an escaped quote, and reopens it.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace('\'', r"'\''")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
