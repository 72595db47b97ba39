//! Geometric operations on a pixel buffer: resize, rotate, DPI rescale.
//!
//! Each operation returns a brand-new buffer; callers replace their surface
//! wholesale. `None` means the request was malformed (zero dimension,
//! non-finite angle, non-positive DPI) and should be skipped.
//!
//! Rotation always acts on the buffer it is given. Rotating twice by 45°
//! is not the same as rotating once by 90°: the second call also rotates
//! the transparent margin added by the first, and resampling error adds up.

use super::calculations::{dpi_scaled_dimensions, is_full_turn, rotated_bounds};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Resampling kernel used by resize and DPI rescale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    Nearest,
    /// Bilinear.
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Resample to exactly `width`×`height`. Aspect ratio is not preserved.
pub fn resize(
    source: &RgbaImage,
    width: u32,
    height: u32,
    filter: ResampleFilter,
) -> Option<RgbaImage> {
    if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
        return None;
    }
    if source.dimensions() == (width, height) {
        return Some(source.clone());
    }
    Some(imageops::resize(source, width, height, filter.into()))
}

/// Scale by `dpi / 96`, flooring the new dimensions.
pub fn rescale_to_dpi(source: &RgbaImage, dpi: f64, filter: ResampleFilter) -> Option<RgbaImage> {
    let (width, height) = dpi_scaled_dimensions(source.width(), source.height(), dpi)?;
    resize(source, width, height, filter)
}

/// Rotate clockwise by `degrees` around the center, growing the canvas to the
/// rotated bounding box so nothing is clipped. New margins are transparent.
pub fn rotate(source: &RgbaImage, degrees: f64) -> Option<RgbaImage> {
    if !degrees.is_finite() {
        return None;
    }
    if is_full_turn(degrees) {
        return Some(source.clone());
    }

    let (src_w, src_h) = source.dimensions();
    let (dst_w, dst_h) = rotated_bounds(src_w, src_h, degrees);
    if dst_w == 0 || dst_h == 0 {
        return None;
    }

    let (sin, cos) = degrees.to_radians().sin_cos();
    let (src_cx, src_cy) = (src_w as f64 / 2.0, src_h as f64 / 2.0);
    let (dst_cx, dst_cy) = (dst_w as f64 / 2.0, dst_h as f64 / 2.0);

    let mut out = RgbaImage::new(dst_w, dst_h);
    let row_len = dst_w as usize * 4;
    let buffer: &mut [u8] = &mut out;

    buffer
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 + 0.5 - dst_cy;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let dx = x as f64 + 0.5 - dst_cx;
                // Inverse rotation maps the destination pixel center back into the source.
                let sx = cos * dx + sin * dy + src_cx;
                let sy = -sin * dx + cos * dy + src_cy;
                px.copy_from_slice(&sample_bilinear(source, sx - 0.5, sy - 0.5));
            }
        });

    Some(out)
}

/// Bilinear sample at continuous pixel coordinates. Outside the image is
/// transparent; color is interpolated premultiplied so edges don't darken.
fn sample_bilinear(source: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];

    let mut premul = [0.0f64; 3];
    let mut alpha = 0.0f64;
    for (tx, ty, weight) in taps {
        if weight <= 0.0
            || tx < 0.0
            || ty < 0.0
            || tx >= source.width() as f64
            || ty >= source.height() as f64
        {
            continue;
        }
        let p = source.get_pixel(tx as u32, ty as u32).0;
        let a = p[3] as f64 / 255.0 * weight;
        for (acc, c) in premul.iter_mut().zip(p) {
            *acc += c as f64 * a;
        }
        alpha += a;
    }

    if alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    [
        channel(premul[0] / alpha),
        channel(premul[1] / alpha),
        channel(premul[2] / alpha),
        channel(alpha * 255.0),
    ]
}
