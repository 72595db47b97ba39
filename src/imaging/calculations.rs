//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Float noise guard used when truncating computed dimensions.
const DIMENSION_EPSILON: f64 = 1e-6;

/// Reference resolution that a DPI value is measured against.
pub const BASE_DPI: f64 = 96.0;

/// Truncate a computed dimension toward zero, the way assigning a fractional
/// width to a drawing surface does.
fn truncate_dimension(value: f64) -> u32 {
    (value + DIMENSION_EPSILON).floor().max(0.0) as u32
}

/// Bounding box of a `width`×`height` rectangle rotated by `degrees`.
///
/// # Returns
/// * `(width, height)` - `w|cos θ| + h|sin θ|` by `w|sin θ| + h|cos θ|`, truncated
///
/// # Examples
/// ```
/// # use retouch::imaging::calculations::rotated_bounds;
/// // 90° swaps the sides
/// assert_eq!(rotated_bounds(200, 100, 90.0), (100, 200));
///
/// // 45° on a square grows it by √2
/// assert_eq!(rotated_bounds(100, 100, 45.0), (141, 141));
/// ```
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (w, h) = (width as f64, height as f64);

    (
        truncate_dimension(w * cos + h * sin),
        truncate_dimension(w * sin + h * cos),
    )
}

/// Dimensions after scaling by `dpi / 96`, floored.
///
/// Returns `None` when the DPI is not a positive finite number or when either
/// scaled side collapses to zero.
pub fn dpi_scaled_dimensions(width: u32, height: u32, dpi: f64) -> Option<(u32, u32)> {
    if !dpi.is_finite() || dpi <= 0.0 {
        return None;
    }
    let scale = dpi / BASE_DPI;
    let w = (width as f64 * scale).floor() as u32;
    let h = (height as f64 * scale).floor() as u32;
    (w > 0 && h > 0).then_some((w, h))
}

/// Whether an angle leaves the surface untouched (a whole number of turns).
pub fn is_full_turn(degrees: f64) -> bool {
    degrees % 360.0 == 0.0
}

/// Convert a size target in kilobytes to bytes.
pub fn target_bytes(target_kb: u32) -> u64 {
    target_kb as u64 * 1024
}
