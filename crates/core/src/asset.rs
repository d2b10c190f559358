//! Asset references and the resolver that turns them into raw bytes.
//!
//! A reference is classified exactly once, at ingestion, into an
//! [`AssetRef::Inline`] (`data:<mime>;base64,<payload>`) or an
//! [`AssetRef::Remote`] locator. [`AssetResolver::resolve`] then decodes or
//! fetches it. Resolution is a pure transform: persisting the bytes is the
//! session workspace's job.

use std::fmt;
use std::time::Duration;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

/// Scheme marker that distinguishes inline references from remote locators.
pub const DATA_URL_PREFIX: &str = "data:";

/// Encoding marker required at the end of an inline reference's header.
const BASE64_MARKER: &str = ";base64";

/// Standard alphabet, padding optional on decode.
const INLINE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failure to turn a single asset reference into bytes.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The remote fetch failed at the transport level or returned non-2xx.
    #[error("failed to fetch {locator}: {reason}")]
    FetchFailed { locator: String, reason: String },

    /// The inline reference is not a well-formed base64 data URL.
    #[error("malformed inline data: {0}")]
    MalformedInline(String),
}

// ---------------------------------------------------------------------------
// AssetRef
// ---------------------------------------------------------------------------

/// An inline `data:` reference, split into header and payload.
///
/// The payload is decoded lazily by [`InlineAsset::decode`], so a malformed
/// payload surfaces as a per-asset resolution failure.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineAsset {
    header: String,
    payload: String,
}

impl InlineAsset {
    /// MIME type declared in the header (`image/png` in
    /// `data:image/png;base64,...`). Empty if the header declares none.
    pub fn mime_type(&self) -> &str {
        self.header.split(';').next().unwrap_or_default()
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, AssetError> {
        let mime = self.header.strip_suffix(BASE64_MARKER).ok_or_else(|| {
            AssetError::MalformedInline(format!(
                "header '{}' is not base64-encoded",
                self.header
            ))
        })?;
        if mime.is_empty() || mime.contains(';') {
            return Err(AssetError::MalformedInline(format!(
                "invalid MIME type in header '{}'",
                self.header
            )));
        }
        if self.payload.is_empty() {
            return Err(AssetError::MalformedInline("empty payload".into()));
        }

        let compact: String = self
            .payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        INLINE_ENGINE
            .decode(compact.as_bytes())
            .map_err(|e| AssetError::MalformedInline(e.to_string()))
    }
}

impl fmt::Debug for InlineAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineAsset")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// A reference to one binary input of a render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// Self-contained embedded data.
    Inline(InlineAsset),
    /// A locator that must be fetched over the network.
    Remote(String),
}

impl AssetRef {
    /// Classify a raw reference string.
    pub fn parse(reference: &str) -> Self {
        match reference.strip_prefix(DATA_URL_PREFIX) {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').unwrap_or((rest, ""));
                Self::Inline(InlineAsset {
                    header: header.to_string(),
                    payload: payload.to_string(),
                })
            }
            None => Self::Remote(reference.trim().to_string()),
        }
    }

    /// Short human-readable description for logs. Never includes payloads.
    pub fn describe(&self) -> String {
        match self {
            Self::Inline(inline) => format!(
                "inline {} ({} encoded bytes)",
                inline.mime_type(),
                inline.payload.len()
            ),
            Self::Remote(locator) => locator.clone(),
        }
    }

    /// File extension to use when materializing this asset.
    ///
    /// Derived from the inline MIME type or from the remote locator's path,
    /// falling back to `default`.
    pub fn file_extension(&self, default: &'static str) -> String {
        let derived = match self {
            Self::Inline(inline) => extension_for_mime(inline.mime_type()).map(str::to_string),
            Self::Remote(locator) => extension_from_locator(locator),
        };
        derived.unwrap_or_else(|| default.to_string())
    }
}

/// Map a MIME type to a conventional file extension.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/aac" => "aac",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/flac" => "flac",
        _ => return None,
    };
    Some(ext)
}

/// Extract a short alphanumeric extension from the last path segment of a URL.
fn extension_from_locator(locator: &str) -> Option<String> {
    let url = reqwest::Url::parse(locator).ok()?;
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Tunables for remote fetches.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Timeout for one remote fetch, connect through last body byte.
    pub fetch_timeout: Duration,
    /// Largest body accepted from a remote locator.
    pub max_asset_bytes: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
            max_asset_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Turns [`AssetRef`]s into bytes. One attempt per asset, no retries.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    client: reqwest::Client,
    max_asset_bytes: u64,
}

impl AssetResolver {
    /// Build a resolver with its own HTTP client.
    pub fn new(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self::with_client(client, config.max_asset_bytes))
    }

    /// Build a resolver reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, max_asset_bytes: u64) -> Self {
        Self {
            client,
            max_asset_bytes,
        }
    }

    /// Resolve a reference into raw bytes.
    pub async fn resolve(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetError> {
        match asset {
            AssetRef::Inline(inline) => inline.decode(),
            AssetRef::Remote(locator) => self.fetch(locator).await,
        }
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, AssetError> {
        let fail = |reason: String| AssetError::FetchFailed {
            locator: locator.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_asset_bytes {
                return Err(fail(format!(
                    "body of {len} bytes exceeds limit of {} bytes",
                    self.max_asset_bytes
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            if (body.len() + chunk.len()) as u64 > self.max_asset_bytes {
                return Err(fail(format!(
                    "body exceeds limit of {} bytes",
                    self.max_asset_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(locator, bytes = body.len(), "Fetched remote asset");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
