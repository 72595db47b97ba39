//! One editing session: an original image, the working surface derived from
//! it, and the last applied filter parameters.
//!
//! ```text
//! load ─→ OriginalImage ─┬─→ WorkingSurface ─→ export ─→ ExportReport
//!                        │        ↑  ↑
//!          apply_filters ┘        │  └ apply_geometry (resize / rotate / dpi)
//!          (re-render from the    │
//!           original every time)  └ reset
//! ```
//!
//! Every operation on a session with no image loaded is a no-op. Edits are
//! refused with [`SessionError::ExportInProgress`] while a background export
//! is running, and so is a second export. `load` and `reset` cancel any
//! outstanding export instead.

use crate::config::EditorConfig;
use crate::imaging::{
    ExportRequest, FilterParameters, GeometryRequest, LossyEncoder, Quality, filters, geometry,
};
use crate::search::{self, CancellationToken, ExportReport, SearchError, SearchEvent};
use crate::surface::{OriginalImage, WorkingSurface};
use image::{DynamicImage, RgbaImage};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("an export is already in progress")]
    ExportInProgress,
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Held for the duration of one export; clears the in-flight flag on drop.
struct ExportGuard(Arc<AtomicBool>);

impl ExportGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::ExportInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An export running on its own thread.
pub struct ExportTask {
    /// Progress: one `Attempt` per encode, then `Finished`.
    pub events: Receiver<SearchEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<ExportReport, SearchError>>,
}

impl ExportTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the export finishes.
    pub fn wait(self) -> Result<ExportReport, SessionError> {
        let result = self
            .handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        Ok(result?)
    }
}

/// Owns the buffers and settings of one editing session.
pub struct EditorSession {
    config: EditorConfig,
    original: Option<OriginalImage>,
    working: Option<WorkingSurface>,
    params: FilterParameters,
    cancel: CancellationToken,
    in_flight: Arc<AtomicBool>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditorSession {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            original: None,
            working: None,
            params: FilterParameters::default(),
            cancel: CancellationToken::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn original(&self) -> Option<&OriginalImage> {
        self.original.as_ref()
    }

    pub fn working(&self) -> Option<&WorkingSurface> {
        self.working.as_ref()
    }

    /// The last applied filter parameters.
    pub fn params(&self) -> &FilterParameters {
        &self.params
    }

    pub fn has_image(&self) -> bool {
        self.original.is_some()
    }

    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Replace the session's image. Cancels any outstanding export.
    pub fn load(&mut self, image: DynamicImage) {
        self.cancel_outstanding();
        let original = OriginalImage::from_dynamic(image);
        let (width, height) = original.dimensions();
        info!(width, height, "image loaded");
        self.working = Some(WorkingSurface::from_original(&original));
        self.original = Some(original);
        self.params = FilterParameters::default();
    }

    /// Discard every edit: working surface back to the original, filters back
    /// to defaults. Cancels any outstanding export.
    pub fn reset(&mut self) {
        self.cancel_outstanding();
        self.params = FilterParameters::default();
        if let Some(original) = &self.original {
            self.working = Some(WorkingSurface::from_original(original));
            info!("session reset");
        }
    }

    /// Trip the current token and detach from the running export: the old
    /// thread keeps its token and in-flight flag, the session gets fresh ones.
    fn cancel_outstanding(&mut self) {
        if self.is_exporting() {
            info!("cancelling outstanding export");
        }
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.in_flight = Arc::new(AtomicBool::new(false));
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_exporting() {
            return Err(SessionError::ExportInProgress);
        }
        Ok(())
    }

    /// Re-render the working surface from the original with `params`, at the
    /// working surface's current dimensions.
    pub fn apply_filters(&mut self, params: FilterParameters) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let (Some(original), Some(working)) = (&self.original, &mut self.working) else {
            debug!("apply_filters with no image loaded");
            return Ok(());
        };

        let (width, height) = working.dimensions();
        let source = if original.dimensions() == (width, height) {
            Cow::Borrowed(original.pixels())
        } else {
            match geometry::resize(original.pixels(), width, height, self.config.resample.filter) {
                Some(scaled) => Cow::Owned(scaled),
                None => {
                    debug!(width, height, "cannot scale original to working size");
                    return Ok(());
                }
            }
        };

        working.replace(filters::render(&source, &params, self.config.overlay.blend));
        self.params = params;
        debug!(?params, "filters applied");
        Ok(())
    }

    /// Apply every geometry field present in `request`.
    ///
    /// Order: resize (skipped when a target size is given), rotate, DPI
    /// rescale, then the size search. Returns the search report when
    /// `target_kb` was requested.
    pub fn apply_geometry(
        &mut self,
        request: &GeometryRequest,
        encoder: &(impl LossyEncoder + ?Sized),
    ) -> Result<Option<ExportReport>, SessionError> {
        self.ensure_idle()?;
        if !self.has_image() {
            debug!("apply_geometry with no image loaded");
            return Ok(None);
        }

        let target_kb = request.target_kb();
        if target_kb.is_none() {
            if let Some((width, height)) = request.dimensions() {
                self.resize(width, height)?;
            }
        }
        if let Some(degrees) = request.rotate_degrees {
            self.rotate(degrees)?;
        }
        if let Some(dpi) = request.dpi {
            self.rescale_to_dpi(dpi)?;
        }

        match target_kb {
            Some(_) => self.export(
                &ExportRequest {
                    target_kb,
                    dpi: None,
                },
                encoder,
            ),
            None => Ok(None),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        let filter = self.config.resample.filter;
        self.replace_working("resize", |src| geometry::resize(src, width, height, filter))
    }

    pub fn rotate(&mut self, degrees: f64) -> Result<(), SessionError> {
        self.replace_working("rotate", |src| geometry::rotate(src, degrees))
    }

    pub fn rescale_to_dpi(&mut self, dpi: f64) -> Result<(), SessionError> {
        let filter = self.config.resample.filter;
        self.replace_working("dpi rescale", |src| geometry::rescale_to_dpi(src, dpi, filter))
    }

    fn replace_working(
        &mut self,
        operation: &str,
        op: impl FnOnce(&RgbaImage) -> Option<RgbaImage>,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let Some(working) = &mut self.working else {
            debug!(operation, "no image loaded");
            return Ok(());
        };
        match op(working.pixels()) {
            Some(pixels) => {
                debug!(operation, width = pixels.width(), height = pixels.height(), "geometry applied");
                working.replace(pixels);
            }
            None => debug!(operation, "malformed request skipped"),
        }
        Ok(())
    }

    /// The surface an export should encode: the working surface, rescaled for
    /// `dpi` when one is given. The working surface itself is left alone.
    fn export_surface(&self, dpi: Option<f64>) -> Option<Arc<RgbaImage>> {
        let working = self.working.as_ref()?;
        let scaled = dpi.and_then(|dpi| {
            geometry::rescale_to_dpi(working.pixels(), dpi, self.config.resample.filter)
        });
        Some(match scaled {
            Some(pixels) => Arc::new(pixels),
            None => working.snapshot(),
        })
    }

    /// Encode the working surface, searching for `target_kb` when given.
    pub fn export(
        &self,
        request: &ExportRequest,
        encoder: &(impl LossyEncoder + ?Sized),
    ) -> Result<Option<ExportReport>, SessionError> {
        let Some(surface) = self.export_surface(request.dpi) else {
            debug!("export with no image loaded");
            return Ok(None);
        };
        let _guard = ExportGuard::acquire(&self.in_flight)?;
        let report = search::run_export(
            &surface,
            request.target_kb(),
            encoder,
            &self.config.search,
            Quality::new(self.config.export.quality),
            &self.cancel,
            None,
        )?;
        Ok(Some(report))
    }

    /// Like [`export`](Self::export), but on a background thread.
    pub fn spawn_export(
        &self,
        request: &ExportRequest,
        encoder: Arc<dyn LossyEncoder>,
    ) -> Result<Option<ExportTask>, SessionError> {
        let Some(surface) = self.export_surface(request.dpi) else {
            debug!("export with no image loaded");
            return Ok(None);
        };
        let guard = ExportGuard::acquire(&self.in_flight)?;

        let (tx, events) = mpsc::channel();
        let cancel = self.cancel.clone();
        let token = cancel.clone();
        let target_kb = request.target_kb();
        let config = self.config.search.clone();
        let quality = Quality::new(self.config.export.quality);

        let handle = thread::spawn(move || {
            let _guard = guard;
            search::run_export(
                &surface,
                target_kb,
                encoder.as_ref(),
                &config,
                quality,
                &token,
                Some(&tx),
            )
        });

        Ok(Some(ExportTask {
            events,
            cancel,
            handle,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::OverlayColor;
    use crate::imaging::backend::tests::MockEncoder;
    use crate::search::ExportStatus;
    use image::Rgba;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90, 255])
        }))
    }

    fn loaded(w: u32, h: u32) -> EditorSession {
        let mut session = EditorSession::default();
        session.load(gradient(w, h));
        session
    }

    fn working_pixels(session: &EditorSession) -> RgbaImage {
        session.working().unwrap().pixels().clone()
    }

    /// Encoder whose first call meets the test at a barrier twice: once on
    /// entry, once before returning. Between the two the test acts while the
    /// export is known to be mid-encode. Constant size, so the search never
    /// converges on its own.
    fn blocking_encoder(barrier: Arc<Barrier>) -> Arc<MockEncoder> {
        let first = AtomicUsize::new(0);
        Arc::new(MockEncoder::with_model(move |_| {
            if first.fetch_add(1, Ordering::SeqCst) == 0 {
                barrier.wait();
                barrier.wait();
            }
            10
        }))
    }

    // =========================================================================
    // No image loaded
    // =========================================================================

    #[test]
    fn operations_without_image_are_noops() {
        let mut session = EditorSession::default();
        let encoder = MockEncoder::linear(1000);

        assert!(session.apply_filters(FilterParameters::default()).is_ok());
        assert!(session.rotate(90.0).is_ok());
        assert!(session.resize(10, 10).is_ok());
        let geometry = GeometryRequest {
            target_kb: Some(5),
            ..Default::default()
        };
        assert!(session.apply_geometry(&geometry, &encoder).unwrap().is_none());
        assert!(session.export(&ExportRequest::default(), &encoder).unwrap().is_none());
        session.reset();

        assert!(!session.has_image());
        assert_eq!(encoder.calls(), 0);
    }

    // =========================================================================
    // Filters
    // =========================================================================

    #[test]
    fn load_starts_from_original() {
        let session = loaded(12, 8);
        assert!(session.working().unwrap().matches(session.original().unwrap()));
        assert_eq!(*session.params(), FilterParameters::default());
    }

    #[test]
    fn identity_filters_reproduce_original() {
        let mut session = loaded(12, 8);
        session.apply_filters(FilterParameters::default()).unwrap();
        assert_eq!(&working_pixels(&session), session.original().unwrap().pixels());
    }

    #[test]
    fn filters_render_from_original_not_previous_result() {
        let mut session = loaded(12, 8);
        let dark = FilterParameters {
            brightness: 50.0,
            ..Default::default()
        };
        session.apply_filters(dark).unwrap();
        let once = working_pixels(&session);
        session.apply_filters(dark).unwrap();
        assert_eq!(working_pixels(&session), once);
        assert_eq!(*session.params(), dark);
    }

    #[test]
    fn filters_after_resize_keep_working_dimensions() {
        let mut session = loaded(12, 8);
        session.resize(30, 20).unwrap();
        session
            .apply_filters(FilterParameters {
                grayscale: 100.0,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.working().unwrap().dimensions(), (30, 20));
        assert_eq!(session.original().unwrap().dimensions(), (12, 8));
    }

    #[test]
    fn overlay_uses_configured_blend() {
        let mut session = EditorSession::default();
        session.load(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            2,
            Rgba([100, 100, 100, 255]),
        )));
        session
            .apply_filters(FilterParameters {
                overlay: Some(OverlayColor::new(200, 0, 100)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.working().unwrap().get_pixel(0, 0), Some(Rgba([150, 50, 100, 255])));
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    #[test]
    fn geometry_applies_resize_then_rotate() {
        let mut session = loaded(40, 20);
        let request = GeometryRequest {
            width: Some(60),
            height: Some(30),
            rotate_degrees: Some(90.0),
            ..Default::default()
        };
        let report = session.apply_geometry(&request, &MockEncoder::linear(1)).unwrap();
        assert!(report.is_none());
        let (w, h) = session.working().unwrap().dimensions();
        assert!(w.abs_diff(30) <= 1 && h.abs_diff(60) <= 1);
    }

    #[test]
    fn target_size_takes_precedence_over_dimensions() {
        let mut session = loaded(40, 20);
        let encoder = MockEncoder::linear(100_000);
        let request = GeometryRequest {
            width: Some(10),
            height: Some(10),
            target_kb: Some(50),
            ..Default::default()
        };
        let report = session.apply_geometry(&request, &encoder).unwrap().unwrap();
        assert_eq!(report.status, ExportStatus::Converged);
        assert_eq!(session.working().unwrap().dimensions(), (40, 20));
    }

    #[test]
    fn malformed_geometry_is_skipped() {
        let mut session = loaded(16, 9);
        let before = working_pixels(&session);
        session.resize(0, 5).unwrap();
        session.rotate(f64::NAN).unwrap();
        session.rescale_to_dpi(-3.0).unwrap();
        assert_eq!(working_pixels(&session), before);
    }

    #[test]
    fn dpi_geometry_rescales_working_surface() {
        let mut session = loaded(48, 24);
        let request = GeometryRequest {
            dpi: Some(48.0),
            ..Default::default()
        };
        session.apply_geometry(&request, &MockEncoder::linear(1)).unwrap();
        assert_eq!(session.working().unwrap().dimensions(), (24, 12));
    }

    // =========================================================================
    // Reset
    // =========================================================================

    #[test]
    fn reset_restores_original_and_defaults() {
        let mut session = loaded(20, 10);
        session
            .apply_filters(FilterParameters {
                sepia: 80.0,
                hue_rotate: 45.0,
                ..Default::default()
            })
            .unwrap();
        session.rotate(33.0).unwrap();
        session.resize(7, 7).unwrap();

        session.reset();
        assert_eq!(&working_pixels(&session), session.original().unwrap().pixels());
        assert_eq!(*session.params(), FilterParameters::default());
    }

    // =========================================================================
    // Export
    // =========================================================================

    #[test]
    fn export_without_target_uses_configured_quality() {
        let mut config = EditorConfig::default();
        config.export.quality = 0.75;
        let mut session = EditorSession::new(config);
        session.load(gradient(4, 4));

        let encoder = MockEncoder::linear(1000);
        let report = session.export(&ExportRequest::default(), &encoder).unwrap().unwrap();
        assert_eq!(report.status, ExportStatus::FixedQuality);
        assert_eq!(encoder.get_qualities(), vec![0.75]);
        assert!(!session.is_exporting());
    }

    #[test]
    fn export_dpi_leaves_working_surface_alone() {
        let session = loaded(96, 48);
        let surface = session.export_surface(Some(192.0)).unwrap();
        assert_eq!(surface.dimensions(), (192, 96));
        assert_eq!(session.working().unwrap().dimensions(), (96, 48));
    }

    #[test]
    fn second_export_while_running_is_refused() {
        let session = loaded(8, 8);
        let barrier = Arc::new(Barrier::new(2));
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };

        let task = session
            .spawn_export(&request, blocking_encoder(barrier.clone()))
            .unwrap()
            .unwrap();
        barrier.wait();
        assert!(session.is_exporting());
        assert!(matches!(
            session.export(&request, &MockEncoder::linear(1)),
            Err(SessionError::ExportInProgress)
        ));

        task.cancel();
        barrier.wait();
        assert!(matches!(
            task.wait(),
            Err(SessionError::Search(SearchError::Cancelled))
        ));
        assert!(!session.is_exporting());
    }

    #[test]
    fn edits_refused_during_export() {
        let mut session = loaded(8, 8);
        let barrier = Arc::new(Barrier::new(2));
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };

        let task = session
            .spawn_export(&request, blocking_encoder(barrier.clone()))
            .unwrap()
            .unwrap();
        barrier.wait();
        assert!(matches!(
            session.apply_filters(FilterParameters::default()),
            Err(SessionError::ExportInProgress)
        ));
        assert!(matches!(session.rotate(90.0), Err(SessionError::ExportInProgress)));

        task.cancel();
        barrier.wait();
        let _ = task.wait();
        assert!(session.rotate(90.0).is_ok());
    }

    #[test]
    fn load_cancels_outstanding_export() {
        let mut session = loaded(8, 8);
        let barrier = Arc::new(Barrier::new(2));
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };

        let task = session
            .spawn_export(&request, blocking_encoder(barrier.clone()))
            .unwrap()
            .unwrap();
        barrier.wait();
        session.load(gradient(3, 3));
        barrier.wait();

        assert!(matches!(
            task.wait(),
            Err(SessionError::Search(SearchError::Cancelled))
        ));
        assert_eq!(session.working().unwrap().dimensions(), (3, 3));
    }

    #[test]
    fn edits_allowed_right_after_load_during_cancelled_export() {
        let mut session = loaded(8, 8);
        let barrier = Arc::new(Barrier::new(2));
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };

        let task = session
            .spawn_export(&request, blocking_encoder(barrier.clone()))
            .unwrap()
            .unwrap();
        barrier.wait();
        session.load(gradient(3, 3));

        // Old export is still mid-encode; the new image is already editable.
        assert!(!session.is_exporting());
        session.apply_filters(FilterParameters::default()).unwrap();
        session.rotate(90.0).unwrap();
        let report = session
            .export(&ExportRequest::default(), &MockEncoder::linear(10))
            .unwrap();
        assert!(report.is_some());

        barrier.wait();
        assert!(matches!(
            task.wait(),
            Err(SessionError::Search(SearchError::Cancelled))
        ));
        assert!(!session.is_exporting());
    }

    #[test]
    fn edits_allowed_right_after_reset_during_cancelled_export() {
        let mut session = loaded(8, 8);
        let barrier = Arc::new(Barrier::new(2));
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };

        let task = session
            .spawn_export(&request, blocking_encoder(barrier.clone()))
            .unwrap()
            .unwrap();
        barrier.wait();
        session.reset();

        session
            .apply_filters(FilterParameters {
                sepia: 50.0,
                ..Default::default()
            })
            .unwrap();
        let second = session
            .spawn_export(&ExportRequest::default(), Arc::new(MockEncoder::linear(10)))
            .unwrap()
            .unwrap();
        assert!(second.wait().is_ok());

        barrier.wait();
        assert!(matches!(
            task.wait(),
            Err(SessionError::Search(SearchError::Cancelled))
        ));
    }

    #[test]
    fn spawned_export_streams_events() {
        let session = loaded(8, 8);
        let request = ExportRequest {
            target_kb: Some(50),
            dpi: None,
        };
        let task = session
            .spawn_export(&request, Arc::new(MockEncoder::linear(100_000)))
            .unwrap()
            .unwrap();

        let events: Vec<SearchEvent> = task.events.iter().collect();
        let report = task.wait().unwrap();
        assert_eq!(events.len() as u32, report.evaluations + 1);
        assert!(matches!(events.last(), Some(SearchEvent::Finished { .. })));
    }
}
