//! # Retouch
//!
//! The core of a raster image editor: load an image, push it through a stack
//! of tonal filters and an optional color overlay, resize, rotate or rescale
//! it, and export it as JPEG, optionally searching for the encoder quality
//! that lands the file near a target size.
//!
//! # Architecture: Original → Working Surface → Export
//!
//! ```text
//! load      DynamicImage  →  OriginalImage      (immutable, kept for reset)
//! edit      OriginalImage →  WorkingSurface     (filters, resize, rotate, dpi)
//! export    WorkingSurface → ExportReport       (fixed quality or size search)
//! ```
//!
//! Filters always re-render from the original, so moving a slider back to its
//! neutral value restores the original pixels exactly. Geometry acts on the
//! working surface and compounds. Reset drops every edit.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | `EditorSession`: owns the buffers, applies edits, runs exports (inline or on a thread) |
//! | [`surface`] | `OriginalImage` and copy-on-write `WorkingSurface` |
//! | [`search`] | Bisection over encoder quality towards a byte target, with cancellation and progress events |
//! | [`imaging`] | Pure-Rust pixel work: filter stack, geometry, JPEG encoding, parameter types |
//! | [`config`] | `retouch.toml` loading, validation, merging, and the stock config |
//! | [`output`] | CLI output formatting for search progress and the export summary |
//!
//! # Design Decisions
//!
//! ## One Encoder Seam
//!
//! The size search only sees the [`imaging::LossyEncoder`] trait. Production
//! uses [`imaging::JpegBackend`]; tests drive the search with a deterministic
//! mock whose size model is known, so convergence and the attempt budget can
//! be asserted exactly without encoding a single pixel.
//!
//! ## Best Effort Is Not Failure
//!
//! When the attempt budget runs out the last encode is still returned, marked
//! [`search::ExportStatus::BudgetExhausted`]. Callers decide whether "close" is
//! good enough; only cancellation and encoder failures are errors.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and JPEG encoding come from the `image` crate; pixel
//! loops run on `rayon`. No system libraries, so the binary is self-contained.

pub mod config;
pub mod imaging;
pub mod output;
pub mod search;
pub mod session;
pub mod surface;
