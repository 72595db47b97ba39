//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between whatever assembles an edit (the CLI, a UI) and the
//! pixel code in [`filters`](super::filters), [`geometry`](super::geometry)
//! and the [`backend`](super::backend) encoders.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (0.01–1.0, default 1.0). Clamped on construction.
//! - [`FilterParameters`]: The tonal knobs plus an optional overlay color. Defaults are the identity.
//! - [`OverlayColor`]: Flat RGB color blended over every pixel.
//! - [`BlendPolicy`]: How the overlay is combined with the filtered pixels.
//! - [`GeometryRequest`] / [`ExportRequest`]: Optional geometry and export requests for one apply action.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding, on a continuous 0.01–1.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Quality(f64);

impl Quality {
    pub const MIN: f64 = 0.01;
    pub const MAX: f64 = 1.0;

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Map onto the 1–100 integer scale most encoders take.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

/// A flat RGB color for the overlay blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl OverlayColor {
    /// Opaque white, the value a color picker starts at. Never blended.
    pub const NEUTRAL: OverlayColor = OverlayColor {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `rrggbb`, `#rgb` or `rgb`. Returns `None` for anything else.
    ///
    /// ```
    /// # use retouch::imaging::OverlayColor;
    /// assert_eq!(OverlayColor::parse_hex("#ff8000"), Some(OverlayColor::new(255, 128, 0)));
    /// assert_eq!(OverlayColor::parse_hex("f80"), Some(OverlayColor::new(255, 136, 0)));
    /// assert_eq!(OverlayColor::parse_hex("orange"), None);
    /// ```
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
            }
            3 => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
                Some(Self::new(channel(0)?, channel(1)?, channel(2)?))
            }
            _ => None,
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Self::NEUTRAL
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// How an overlay color is combined with the filtered image.
///
/// - `Average`: each RGB channel becomes `(old + overlay) / 2`, exact halves
///   rounded to even (`(2 + 3) / 2 = 2`, `(3 + 4) / 2 = 4`); alpha untouched.
/// - `Alpha`: the overlay is composited source-over at 50% opacity.
///
/// The two differ visibly near saturated colors and on transparent pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendPolicy {
    #[default]
    Average,
    Alpha,
}

/// Tonal adjustments plus an optional overlay color.
///
/// Percent values use 100 as identity for brightness, contrast and saturate,
/// 0 as identity for grayscale, sepia and invert. `hue_rotate` is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
    pub brightness: f32,
    pub contrast: f32,
    pub grayscale: f32,
    pub sepia: f32,
    pub invert: f32,
    pub hue_rotate: f32,
    pub saturate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayColor>,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            grayscale: 0.0,
            sepia: 0.0,
            invert: 0.0,
            hue_rotate: 0.0,
            saturate: 100.0,
            overlay: None,
        }
    }
}

impl FilterParameters {
    /// True when rendering with these parameters leaves pixels untouched.
    pub fn is_identity(&self) -> bool {
        let tonal = Self {
            overlay: None,
            ..*self
        };
        tonal == Self::default() && self.overlay.is_none_or(OverlayColor::is_neutral)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Geometry requested by one apply action. Every field is independent and optional.
///
/// `target_kb` takes precedence over `width`/`height` when both are present
/// and positive: the surface is then exported at that size instead of resized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub target_kb: Option<u32>,
    pub rotate_degrees: Option<f64>,
    pub dpi: Option<f64>,
}

impl GeometryRequest {
    /// The explicit dimensions, if both are present and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// The target size, if present and positive.
    pub fn target_kb(&self) -> Option<u32> {
        self.target_kb.filter(|&kb| kb > 0)
    }
}

/// What an export should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub target_kb: Option<u32>,
    pub dpi: Option<f64>,
}

impl ExportRequest {
    pub fn target_kb(&self) -> Option<u32> {
        self.target_kb.filter(|&kb| kb > 0)
    }
}
