//! Editor configuration module.
//!
//! Handles loading, validating, and merging a `retouch.toml` file. Stock
//! defaults are the base layer; a user file only needs the keys it wants to
//! override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [search]
//! tolerance_bytes = 512     # Stop when |size - target| is below this
//! max_attempts = 30         # Narrowing steps before giving up (31 encodes)
//! min_quality = 0.01        # Lower bisection bound
//! max_quality = 1.0         # Upper bisection bound
//!
//! [export]
//! quality = 1.0             # Quality used when no target size is requested
//!
//! [overlay]
//! blend = "average"         # "average" or "alpha"
//!
//! [resample]
//! filter = "triangle"       # nearest | triangle | catmull-rom | gaussian | lanczos3
//!
//! [processing]
//! max_threads = 4           # Max pixel worker threads (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BlendPolicy, Quality, ResampleFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Editor configuration loaded from a TOML file.
///
/// All fields have defaults that reproduce the behavior of the original
/// editor. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Size-targeting search constants.
    pub search: SearchConfig,
    /// Fixed-quality export settings.
    pub export: ExportConfig,
    /// Overlay blend policy.
    pub overlay: OverlayConfig,
    /// Resampling kernel for resize and DPI rescale.
    pub resample: ResampleConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl EditorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if search.tolerance_bytes == 0 {
            return Err(ConfigError::Validation(
                "search.tolerance_bytes must be positive".into(),
            ));
        }
        let in_range = |q: f64| (Quality::MIN..=Quality::MAX).contains(&q);
        if !in_range(search.min_quality) || !in_range(search.max_quality) {
            return Err(ConfigError::Validation(
                "search.min_quality and search.max_quality must be within 0.01-1.0".into(),
            ));
        }
        if search.min_quality > search.max_quality {
            return Err(ConfigError::Validation(
                "search.min_quality must not exceed search.max_quality".into(),
            ));
        }
        if !(self.export.quality > 0.0 && self.export.quality <= Quality::MAX) {
            return Err(ConfigError::Validation(
                "export.quality must be within (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Bisection constants for the size-targeting search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Accept an encode whose size is within this many bytes of the target.
    pub tolerance_bytes: u64,
    /// Narrowing steps allowed before the last encode is returned as-is.
    pub max_attempts: u32,
    pub min_quality: f64,
    pub max_quality: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance_bytes: 512,
            max_attempts: 30,
            min_quality: Quality::MIN,
            max_quality: Quality::MAX,
        }
    }
}

/// Export settings for the fixed-quality path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub quality: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            quality: Quality::MAX,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    pub blend: BlendPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResampleConfig {
    pub filter: ResampleFilter,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pixel worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_threads
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EditorConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EditorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EditorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, or stock defaults when `path` is `None`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<EditorConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = match path {
        Some(p) => load_raw_config(p)?,
        None => None,
    };
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Retouch Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Size-targeting search
# ---------------------------------------------------------------------------
[search]
# Accept an encode whose byte size is within this distance of the target.
tolerance_bytes = 512

# Narrowing steps before the last encode is returned as best effort.
# The search performs at most max_attempts + 1 encodes.
max_attempts = 30

# Quality bounds for the bisection (0.01 = worst, 1.0 = best).
min_quality = 0.01
max_quality = 1.0

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Quality used when no target size is requested.
quality = 1.0

# ---------------------------------------------------------------------------
# Overlay color
# ---------------------------------------------------------------------------
[overlay]
# "average": each channel becomes (pixel + overlay) / 2, alpha untouched.
# "alpha":   overlay composited on top at 50% opacity.
blend = "average"

# ---------------------------------------------------------------------------
# Resampling
# ---------------------------------------------------------------------------
[resample]
# Kernel for resize and DPI rescale:
# nearest | triangle (bilinear) | catmull-rom | gaussian | lanczos3
filter = "triangle"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum pixel worker threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
