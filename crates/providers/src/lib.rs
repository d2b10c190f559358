//! HTTP clients for the external services Reelsmith proxies.
//!
//! Each service sits behind an `async_trait` seam ([`SpeechSynthesizer`],
//! [`Transcriber`], [`ContentGenerator`], [`AccountStore`]) so the API layer
//! can be exercised without network access.

pub mod accounts;
pub mod error;
pub mod generation;
pub mod speech;
pub mod transcription;

pub use accounts::{AccountStore, SupabaseAccountStore};
pub use error::ProviderError;
pub use generation::{ContentGenerator, GeminiClient, GeneratedImage, TextGenerationOptions};
pub use speech::{ElevenLabsClient, SpeechSynthesizer};
pub use transcription::{AssemblyAiClient, CaptionWord, Transcriber};

#[cfg(test)]
mod test_support;
