//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` |
//! | **Tonal filters** | color matrices, parallel via `rayon` |
//! | **Resize / DPI** | `image::imageops::resize` |
//! | **Rotate** | inverse-mapped bilinear sampling |
//! | **Encode → JPEG** | `image::codecs::jpeg::JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Filters / Geometry**: Pixel operations producing new buffers
//! - **Backend**: [`LossyEncoder`] trait + [`JpegBackend`]

pub mod backend;
pub mod calculations;
pub mod filters;
pub mod geometry;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, LossyEncoder};
pub use filters::render;
pub use geometry::ResampleFilter;
pub use params::{
    BlendPolicy, ExportRequest, FilterParameters, GeometryRequest, OverlayColor, Quality,
};
pub use rust_backend::JpegBackend;
