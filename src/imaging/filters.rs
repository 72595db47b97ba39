//! Tonal filter stack and overlay blend.
//!
//! The tonal stack follows the Filter Effects Level 1 definitions of the CSS
//! shorthand filters, applied in this fixed order:
//!
//! ```text
//! brightness → contrast → grayscale → sepia → invert → hue-rotate → saturate
//! ```
//!
//! Every stage works on straight (non-premultiplied) RGB in `[0, 1]` and clamps
//! its output before the next stage sees it. Alpha is never touched. Stages
//! sitting at their neutral value are dropped from the chain, so rendering with
//! [`FilterParameters::default`] returns the source bit for bit.
//!
//! The optional overlay color is blended in a second pass over the already
//! rasterized tonal result, never folded into the tonal chain.

use super::params::{BlendPolicy, FilterParameters, OverlayColor};
use image::RgbaImage;
use rayon::prelude::*;

type Matrix = [[f32; 3]; 3];

/// One stage of the tonal chain.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    /// `c' = slope·c + intercept` on every channel.
    Linear { slope: f32, intercept: f32 },
    /// 3×3 color matrix.
    Matrix(Matrix),
    /// `c' = amount + c·(1 − 2·amount)`.
    Invert(f32),
}

impl Stage {
    fn apply(self, [r, g, b]: [f32; 3]) -> [f32; 3] {
        let out = match self {
            Stage::Linear { slope, intercept } => [
                r * slope + intercept,
                g * slope + intercept,
                b * slope + intercept,
            ],
            Stage::Matrix(m) => [
                m[0][0] * r + m[0][1] * g + m[0][2] * b,
                m[1][0] * r + m[1][1] * g + m[1][2] * b,
                m[2][0] * r + m[2][1] * g + m[2][2] * b,
            ],
            Stage::Invert(amount) => {
                let k = 1.0 - 2.0 * amount;
                [amount + r * k, amount + g * k, amount + b * k]
            }
        };
        out.map(|c| c.clamp(0.0, 1.0))
    }
}

fn percent(value: f32) -> Option<f32> {
    value.is_finite().then_some(value / 100.0)
}

fn grayscale_matrix(amount: f32) -> Matrix {
    let a = 1.0 - amount;
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let a = 1.0 - amount;
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

/// The tonal part of a [`FilterParameters`], compiled into per-pixel stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TonalChain {
    stages: Vec<Stage>,
}

impl TonalChain {
    pub fn from_params(params: &FilterParameters) -> Self {
        let mut stages = Vec::with_capacity(7);

        if let Some(b) = percent(params.brightness).filter(|&b| b != 1.0) {
            stages.push(Stage::Linear {
                slope: b.max(0.0),
                intercept: 0.0,
            });
        }
        if let Some(c) = percent(params.contrast).filter(|&c| c != 1.0) {
            let c = c.max(0.0);
            stages.push(Stage::Linear {
                slope: c,
                intercept: 0.5 - 0.5 * c,
            });
        }
        if let Some(g) = percent(params.grayscale).filter(|&g| g != 0.0) {
            stages.push(Stage::Matrix(grayscale_matrix(g.clamp(0.0, 1.0))));
        }
        if let Some(s) = percent(params.sepia).filter(|&s| s != 0.0) {
            stages.push(Stage::Matrix(sepia_matrix(s.clamp(0.0, 1.0))));
        }
        if let Some(i) = percent(params.invert).filter(|&i| i != 0.0) {
            stages.push(Stage::Invert(i.clamp(0.0, 1.0)));
        }
        if params.hue_rotate.is_finite() && params.hue_rotate % 360.0 != 0.0 {
            stages.push(Stage::Matrix(hue_rotate_matrix(params.hue_rotate)));
        }
        if let Some(s) = percent(params.saturate).filter(|&s| s != 1.0) {
            stages.push(Stage::Matrix(saturate_matrix(s.max(0.0))));
        }

        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    fn apply_to_pixel(&self, px: &mut [u8]) {
        let mut rgb = [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        ];
        for stage in &self.stages {
            rgb = stage.apply(rgb);
        }
        for (dst, c) in px.iter_mut().zip(rgb) {
            *dst = to_byte(c);
        }
    }

    /// Apply the chain to every pixel in place.
    pub fn apply(&self, image: &mut RgbaImage) {
        if self.is_empty() {
            return;
        }
        let pixels: &mut [u8] = image;
        pixels
            .par_chunks_exact_mut(4)
            .for_each(|px| self.apply_to_pixel(px));
    }
}

#[inline]
fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// `(a + b) / 2`, with exact halves rounded to the nearest even value.
fn average_half_even(a: u8, b: u8) -> u8 {
    let sum = a as u16 + b as u16;
    let half = sum / 2;
    if sum % 2 == 1 && half % 2 == 1 {
        (half + 1) as u8
    } else {
        half as u8
    }
}

/// Blend a flat color over every pixel in place.
pub fn apply_overlay(image: &mut RgbaImage, color: OverlayColor, policy: BlendPolicy) {
    let overlay = [color.r, color.g, color.b];
    let pixels: &mut [u8] = image;

    match policy {
        BlendPolicy::Average => pixels.par_chunks_exact_mut(4).for_each(|px| {
            for (c, o) in px.iter_mut().zip(overlay) {
                *c = average_half_even(*c, o);
            }
        }),
        BlendPolicy::Alpha => pixels.par_chunks_exact_mut(4).for_each(|px| {
            const SRC_ALPHA: f32 = 0.5;
            let dst_alpha = px[3] as f32 / 255.0;
            let out_alpha = SRC_ALPHA + dst_alpha * (1.0 - SRC_ALPHA);
            for (c, o) in px.iter_mut().zip(overlay) {
                let src = o as f32 / 255.0 * SRC_ALPHA;
                let dst = *c as f32 / 255.0 * dst_alpha * (1.0 - SRC_ALPHA);
                *c = to_byte((src + dst) / out_alpha);
            }
            px[3] = to_byte(out_alpha);
        }),
    }
}

/// Render `source` through the tonal chain, then the overlay (if any).
///
/// The source is never modified; the result is a fresh buffer of the same size.
pub fn render(source: &RgbaImage, params: &FilterParameters, policy: BlendPolicy) -> RgbaImage {
    let mut out = source.clone();
    TonalChain::from_params(params).apply(&mut out);
    if let Some(color) = params.overlay.filter(|c| !c.is_neutral()) {
        apply_overlay(&mut out, color, policy);
    }
    out
}
