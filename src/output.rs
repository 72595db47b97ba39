//! CLI output formatting for the `edit` command.
//!
//! # Output Format
//!
//! ## Search progress
//!
//! One line per encode while a target size is being searched:
//!
//! ```text
//!     attempt 01  q=0.5050  61.4 KB  (target 50.0 KB)
//!     attempt 02  q=0.2575  38.0 KB  (target 50.0 KB)
//! ```
//!
//! ## Summary
//!
//! ```text
//! Export → edited_image.jpg
//!     Dimensions: 1920x1080
//!     Size: 50.2 KB (51412 bytes)
//!     Quality: 0.3806
//!     Target: 50.0 KB, converged after 9 encodes
//! ```
//!
//! With `--json` the same summary is one JSON object instead.
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::search::{ExportReport, ExportStatus, SearchEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File stem of the export when no `--output` is given.
pub const DEFAULT_OUTPUT_STEM: &str = "edited_image";

/// `edited_image.<extension>` for the encoder in use.
pub fn default_output_path(extension: &str) -> PathBuf {
    PathBuf::from(format!("{DEFAULT_OUTPUT_STEM}.{extension}"))
}

/// Machine-readable export summary, printed with `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub output: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub quality: f64,
    pub status: ExportStatus,
    pub evaluations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_bytes: Option<u64>,
}

impl ExportSummary {
    pub fn new(
        report: &ExportReport,
        output: &Path,
        mime_type: &str,
        dimensions: (u32, u32),
    ) -> Self {
        Self {
            output: output.display().to_string(),
            mime_type: mime_type.to_string(),
            width: dimensions.0,
            height: dimensions.1,
            bytes: report.artifact.size(),
            quality: report.artifact.quality.value(),
            status: report.status,
            evaluations: report.evaluations,
            target_bytes: report.target_bytes,
        }
    }
}

/// Byte count as kilobytes (1 KB = 1024 bytes), one decimal.
fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn plural(n: u32, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Search progress
// ============================================================================

/// Format a single search progress event as display lines.
///
/// `Finished` produces nothing; the summary covers it.
pub fn format_search_event(event: &SearchEvent) -> Vec<String> {
    match event {
        SearchEvent::Attempt {
            attempt,
            quality,
            size,
            target_bytes,
        } => vec![format!(
            "    attempt {:0>2}  q={:.4}  {}  (target {})",
            attempt,
            quality,
            format_kb(*size as u64),
            format_kb(*target_bytes)
        )],
        SearchEvent::Finished { .. } => Vec::new(),
    }
}

// ============================================================================
// Summary
// ============================================================================

fn status_line(summary: &ExportSummary) -> String {
    let encodes = plural(summary.evaluations, "encode");
    match (summary.status, summary.target_bytes) {
        (ExportStatus::FixedQuality, _) | (_, None) => "Target: none (fixed quality)".to_string(),
        (ExportStatus::Converged, Some(target)) => {
            format!("Target: {}, converged after {}", format_kb(target), encodes)
        }
        (ExportStatus::BudgetExhausted, Some(target)) => format!(
            "Target: {}, not reached after {} (closest last attempt kept)",
            format_kb(target),
            encodes
        ),
    }
}

/// Format the plain-text export summary.
pub fn format_export_summary(summary: &ExportSummary) -> Vec<String> {
    vec![
        format!("Export \u{2192} {}", summary.output),
        format!("    Dimensions: {}x{}", summary.width, summary.height),
        format!(
            "    Size: {} ({} bytes)",
            format_kb(summary.bytes as u64),
            summary.bytes
        ),
        format!("    Quality: {:.4}", summary.quality),
        format!("    {}", status_line(summary)),
    ]
}

/// Print the export summary, as text or JSON.
pub fn print_export_summary(summary: &ExportSummary, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        for line in format_export_summary(summary) {
            println!("{}", line);
        }
    }
    Ok(())
}
