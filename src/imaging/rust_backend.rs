//! Pure Rust imaging backend: decode inputs, encode JPEG.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! JPEG has no alpha channel. Pixels are written with their straight RGB
//! values and alpha dropped, so fully transparent areas (rotation margins)
//! come out black.

use super::backend::{BackendError, LossyEncoder};
use super::params::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::path::Path;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// Returns the image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> Vec<&'static str> {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
}

/// Whether `path` has an extension one of the compiled-in decoders reads.
/// Case-insensitive.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| supported_input_extensions().contains(&ext.as_str()))
}

/// Load and decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Decode an image already held in memory.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode image: {}", e)))
}

/// JPEG encoder on top of the `image` crate.
///
/// Continuous quality is mapped onto the encoder's 1–100 scale, so nearby
/// qualities may produce identical output.
pub struct JpegBackend;

impl JpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_alpha(surface: &RgbaImage) -> Vec<u8> {
    surface
        .as_raw()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

impl LossyEncoder for JpegBackend {
    fn encode(&self, surface: &RgbaImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return Err(BackendError::ProcessingFailed(
                "Cannot encode an empty surface".into(),
            ));
        }

        let rgb = strip_alpha(surface);
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.percent())
            .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
        Ok(out)
    }

    fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}
