//! Reelsmith core library.
//!
//! Hosts the video assembly pipeline (asset resolution, session workspaces,
//! timeline planning, ffmpeg encoding, packaging) together with the pure
//! request validation and event classification logic shared by the API.

pub mod asset;
pub mod error;
pub mod ffmpeg;
pub mod render;
pub mod request;
pub mod script;
pub mod subscription;
pub mod timeline;
pub mod workspace;

#[cfg(test)]
mod test_support;
