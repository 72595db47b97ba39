//! The two pixel buffers an editing session holds.
//!
//! - [`OriginalImage`]: the decoded input. Never modified after load.
//! - [`WorkingSurface`]: what the user sees and what gets exported.
//!
//! Both wrap `Arc<RgbaImage>`. A fresh working surface shares the original's
//! buffer and only copies it on the first write, so a reset is free and the
//! original can never be mutated through the working surface.

use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Immutable decoded source image.
#[derive(Debug, Clone)]
pub struct OriginalImage {
    pixels: Arc<RgbaImage>,
}

impl OriginalImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Mutable pixel buffer derived from an [`OriginalImage`].
#[derive(Debug, Clone)]
pub struct WorkingSurface {
    pixels: Arc<RgbaImage>,
}

impl WorkingSurface {
    /// A surface showing the original, sharing its buffer until written.
    pub fn from_original(original: &OriginalImage) -> Self {
        Self {
            pixels: Arc::clone(&original.pixels),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Cheap handle to the current pixels, unaffected by later edits.
    pub fn snapshot(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    /// Write one pixel. Returns `false` when out of bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) -> bool {
        if x >= self.width() || y >= self.height() {
            return false;
        }
        Arc::make_mut(&mut self.pixels).put_pixel(x, y, pixel);
        true
    }

    /// Swap in a whole new buffer (resize, rotate, re-render).
    pub fn replace(&mut self, pixels: RgbaImage) {
        self.pixels = Arc::new(pixels);
    }

    /// True when this surface still shows exactly the original's pixels.
    pub fn matches(&self, original: &OriginalImage) -> bool {
        Arc::ptr_eq(&self.pixels, &original.pixels) || *self.pixels == *original.pixels
    }
}
