//! Request validation shared by the HTTP handlers.
//!
//! Everything here runs before any workspace is allocated or any external
//! service is called.

use crate::asset::AssetRef;
use crate::error::CoreError;

/// Maximum number of images accepted in one render request.
pub const MAX_RENDER_IMAGES: usize = 500;

/// A validated render request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    audio: AssetRef,
    images: Vec<AssetRef>,
    duration_secs: f64,
}

impl RenderRequest {
    /// Validate raw request fields and classify every asset reference.
    pub fn new(audio: &str, images: &[String], duration_secs: f64) -> Result<Self, CoreError> {
        let audio = require_text("audioUrl", Some(audio))?;
        if images.is_empty() {
            return Err(CoreError::Validation("images must not be empty".into()));
        }
        if images.len() > MAX_RENDER_IMAGES {
            return Err(CoreError::Validation(format!(
                "at most {MAX_RENDER_IMAGES} images are allowed, got {}",
                images.len()
            )));
        }
        if let Some(index) = images.iter().position(|i| i.trim().is_empty()) {
            return Err(CoreError::Validation(format!("images[{index}] is empty")));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(CoreError::Validation(format!(
                "duration must be a positive number of seconds, got {duration_secs}"
            )));
        }
        // Each image needs at least one millisecond of screen time.
        if ((duration_secs * 1000.0).round() as u64) < images.len() as u64 {
            return Err(CoreError::Validation(format!(
                "duration {duration_secs}s is too short for {} images",
                images.len()
            )));
        }

        Ok(Self {
            audio: AssetRef::parse(audio),
            images: images.iter().map(|i| AssetRef::parse(i)).collect(),
            duration_secs,
        })
    }

    pub fn audio(&self) -> &AssetRef {
        &self.audio
    }

    pub fn images(&self) -> &[AssetRef] {
        &self.images
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Require a present, non-blank text field.
pub fn require_text<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::Validation(format!("Missing {field}"))),
    }
}
