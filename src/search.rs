//! Size-targeted export: find an encoder quality whose output lands near a
//! byte budget.
//!
//! ## Algorithm
//!
//! Plain bisection over quality:
//!
//! ```text
//! target = kb · 1024, bounds = [0.01, 1.0]
//! loop:
//!     q = (min + max) / 2
//!     size = len(encode(q))
//!     |size − target| < 512      → Converged
//!     30 narrowing steps done    → BudgetExhausted (keep the last encode)
//!     size > target              → max = q
//!     otherwise                  → min = q
//! ```
//!
//! At most `max_attempts + 1` (31) encodes happen. The constants come from
//! [`SearchConfig`].
//!
//! ## Assumptions
//!
//! The search assumes encoded size never shrinks as quality grows. Nothing
//! checks this. Near-uniform images can violate it, and then the search may
//! settle on a quality that is not the closest one; it still terminates and
//! still returns its last encode.
//!
//! Non-convergence is not an error: the report's [`ExportStatus`] says
//! whether the target was met or the budget ran out.
//!
//! ## Cancellation
//!
//! A [`CancellationToken`] is checked before every encode. A tripped token
//! ends the search with [`SearchError::Cancelled`] and discards the partial
//! result.

use crate::config::SearchConfig;
use crate::imaging::calculations::target_bytes;
use crate::imaging::{BackendError, LossyEncoder, Quality};
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("export cancelled")]
    Cancelled,
    #[error("encoding failed: {0}")]
    Encode(#[from] BackendError),
}

/// Shared flag that aborts an outstanding search.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Encoded bytes plus the quality that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub quality: Quality,
}

impl EncodedArtifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// How an export ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportStatus {
    /// No target size: one encode at the configured quality.
    FixedQuality,
    /// The last encode is within tolerance of the target.
    Converged,
    /// The attempt budget ran out; the last encode is returned anyway.
    BudgetExhausted,
}

/// Result of one export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub artifact: EncodedArtifact,
    pub status: ExportStatus,
    /// Number of encoder invocations.
    pub evaluations: u32,
    pub target_bytes: Option<u64>,
}

impl ExportReport {
    pub fn met_target(&self) -> bool {
        self.status != ExportStatus::BudgetExhausted
    }
}

/// Progress notifications sent while an export runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SearchEvent {
    Attempt {
        attempt: u32,
        quality: f64,
        size: usize,
        target_bytes: u64,
    },
    Finished {
        status: ExportStatus,
        evaluations: u32,
        quality: f64,
        size: usize,
    },
}

fn emit(events: Option<&Sender<SearchEvent>>, event: SearchEvent) {
    if let Some(tx) = events {
        // A dropped receiver just means nobody is listening any more.
        let _ = tx.send(event);
    }
}

/// Bisection bounds and step counter for one search.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SearchState {
    min_quality: f64,
    max_quality: f64,
    narrowing_steps: u32,
}

impl SearchState {
    fn new(config: &SearchConfig) -> Self {
        Self {
            min_quality: config.min_quality,
            max_quality: config.max_quality,
            narrowing_steps: 0,
        }
    }

    fn midpoint(&self) -> f64 {
        (self.min_quality + self.max_quality) / 2.0
    }

    fn holds(&self, quality: f64) -> bool {
        Quality::MIN <= self.min_quality
            && self.min_quality <= quality
            && quality <= self.max_quality
            && self.max_quality <= Quality::MAX
    }

    fn narrow(&mut self, quality: f64, too_large: bool) {
        if too_large {
            self.max_quality = quality;
        } else {
            self.min_quality = quality;
        }
        self.narrowing_steps += 1;
    }
}

fn finish(
    artifact: EncodedArtifact,
    status: ExportStatus,
    evaluations: u32,
    target_bytes: Option<u64>,
    events: Option<&Sender<SearchEvent>>,
) -> ExportReport {
    emit(
        events,
        SearchEvent::Finished {
            status,
            evaluations,
            quality: artifact.quality.value(),
            size: artifact.size(),
        },
    );
    ExportReport {
        artifact,
        status,
        evaluations,
        target_bytes,
    }
}

/// Encode once at a fixed quality.
pub fn encode_fixed(
    surface: &RgbaImage,
    encoder: &(impl LossyEncoder + ?Sized),
    quality: Quality,
    events: Option<&Sender<SearchEvent>>,
) -> Result<ExportReport, SearchError> {
    let bytes = encoder.encode(surface, quality)?;
    info!(quality = quality.value(), size = bytes.len(), "fixed-quality export");
    let artifact = EncodedArtifact { bytes, quality };
    Ok(finish(artifact, ExportStatus::FixedQuality, 1, None, events))
}

/// Bisect on quality until the encoded size is within tolerance of
/// `target_kb` kilobytes or the attempt budget is spent.
pub fn search(
    surface: &RgbaImage,
    target_kb: u32,
    encoder: &(impl LossyEncoder + ?Sized),
    config: &SearchConfig,
    cancel: &CancellationToken,
    events: Option<&Sender<SearchEvent>>,
) -> Result<ExportReport, SearchError> {
    let target = target_bytes(target_kb);
    let mut state = SearchState::new(config);
    let mut evaluations = 0u32;

    loop {
        if cancel.is_cancelled() {
            info!(evaluations, "size search cancelled");
            return Err(SearchError::Cancelled);
        }

        let quality = state.midpoint();
        debug_assert!(state.holds(quality), "bounds violated: {state:?} q={quality}");

        let bytes = encoder.encode(surface, Quality::new(quality))?;
        evaluations += 1;
        let size = bytes.len();

        debug!(attempt = evaluations, quality, size, target, "size search step");
        emit(
            events,
            SearchEvent::Attempt {
                attempt: evaluations,
                quality,
                size,
                target_bytes: target,
            },
        );

        let artifact = EncodedArtifact {
            bytes,
            quality: Quality::new(quality),
        };

        if (size as u64).abs_diff(target) < config.tolerance_bytes {
            info!(evaluations, quality, size, target, "size search converged");
            return Ok(finish(artifact, ExportStatus::Converged, evaluations, Some(target), events));
        }
        if state.narrowing_steps >= config.max_attempts {
            warn!(
                evaluations,
                quality, size, target, "size search budget exhausted, keeping last encode"
            );
            return Ok(finish(
                artifact,
                ExportStatus::BudgetExhausted,
                evaluations,
                Some(target),
                events,
            ));
        }

        state.narrow(quality, size as u64 > target);
    }
}

/// Run an export: a size search when `target_kb` is given, otherwise one
/// encode at `fixed_quality`.
pub fn run_export(
    surface: &RgbaImage,
    target_kb: Option<u32>,
    encoder: &(impl LossyEncoder + ?Sized),
    config: &SearchConfig,
    fixed_quality: Quality,
    cancel: &CancellationToken,
    events: Option<&Sender<SearchEvent>>,
) -> Result<ExportReport, SearchError> {
    match target_kb {
        Some(kb) => search(surface, kb, encoder, config, cancel, events),
        None => {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            encode_fixed(surface, encoder, fixed_quality, events)
        }
    }
}
