//! Lossy encoder trait and shared types.
//!
//! The [`LossyEncoder`] trait is the one seam between the editing pipeline
//! and an actual codec: encode a pixel buffer at a quality, get bytes back.
//! The size-targeting search only ever talks to this trait, so it can be
//! driven by a deterministic mock in tests.
//!
//! The production implementation is
//! [`JpegBackend`](super::rust_backend::JpegBackend), built on the `image`
//! crate's pure-Rust JPEG encoder.

use super::params::Quality;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for lossy encoders.
///
/// Implementations must be deterministic for a given (surface, quality) pair
/// and are expected, but not required, to produce output that grows with
/// quality.
pub trait LossyEncoder: Send + Sync {
    /// Encode the surface at the given quality.
    fn encode(&self, surface: &RgbaImage, quality: Quality) -> Result<Vec<u8>, BackendError>;

    /// MIME type of the produced bytes.
    fn mime_type(&self) -> &'static str;

    /// File extension for the produced bytes.
    fn extension(&self) -> &'static str;
}
