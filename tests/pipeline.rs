//! End-to-end checks through the public API: load → edit → export with the
//! real JPEG encoder.
//!
//! Run with: cargo test --test pipeline

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use retouch::config::{EditorConfig, load_config};
use retouch::imaging::{
    BlendPolicy, ExportRequest, FilterParameters, GeometryRequest, JpegBackend, LossyEncoder,
    OverlayColor, Quality, rust_backend,
};
use retouch::search::ExportStatus;
use retouch::session::EditorSession;

/// Deterministic high-entropy image so JPEG size tracks quality.
fn noisy(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let n = x
            .wrapping_mul(2654435761)
            .wrapping_add(y.wrapping_mul(2246822519))
            .rotate_left(13);
        Rgba([n as u8, (n >> 8) as u8, (n >> 16) as u8, 255])
    })
}

fn session_with(image: RgbaImage) -> EditorSession {
    let mut session = EditorSession::default();
    session.load(DynamicImage::ImageRgba8(image));
    session
}

fn working(session: &EditorSession) -> RgbaImage {
    session.working().unwrap().pixels().clone()
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn neutral_filters_reproduce_original() {
    let mut session = session_with(noisy(40, 30));
    session
        .apply_filters(FilterParameters {
            overlay: Some(OverlayColor::NEUTRAL),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(&working(&session), session.original().unwrap().pixels());
}

#[test]
fn filters_then_back_to_neutral_restore_original() {
    let mut session = session_with(noisy(40, 30));
    session
        .apply_filters(FilterParameters {
            brightness: 140.0,
            sepia: 60.0,
            hue_rotate: 120.0,
            overlay: Some(OverlayColor::new(255, 0, 0)),
            ..Default::default()
        })
        .unwrap();
    assert_ne!(&working(&session), session.original().unwrap().pixels());

    session.apply_filters(FilterParameters::default()).unwrap();
    assert_eq!(&working(&session), session.original().unwrap().pixels());
}

#[test]
fn alpha_blend_from_config_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("retouch.toml");
    std::fs::write(&path, "[overlay]\nblend = \"alpha\"\n").unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.overlay.blend, BlendPolicy::Alpha);

    let mut session = EditorSession::new(config);
    session.load(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        2,
        2,
        Rgba([0, 0, 0, 0]),
    )));
    session
        .apply_filters(FilterParameters {
            overlay: Some(OverlayColor::new(255, 0, 0)),
            ..Default::default()
        })
        .unwrap();
    // Over a transparent pixel, a 50% overlay leaves a half-opaque overlay color.
    let px = session.working().unwrap().get_pixel(0, 0).unwrap();
    assert_eq!(px.0, [255, 0, 0, 128]);
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn rotation_zero_is_identity() {
    let mut session = session_with(noisy(33, 21));
    session.rotate(0.0).unwrap();
    assert_eq!(&working(&session), session.original().unwrap().pixels());
}

#[test]
fn rotation_ninety_swaps_dimensions() {
    let mut session = session_with(noisy(64, 20));
    session.rotate(90.0).unwrap();
    let (w, h) = session.working().unwrap().dimensions();
    assert!(w.abs_diff(20) <= 1, "width {w}");
    assert!(h.abs_diff(64) <= 1, "height {h}");
}

#[test]
fn rotation_forty_five_on_square() {
    let mut session = session_with(noisy(100, 100));
    session.rotate(45.0).unwrap();
    let (w, h) = session.working().unwrap().dimensions();
    assert!(w.abs_diff(141) <= 1 && h.abs_diff(141) <= 1, "{w}x{h}");
}

#[test]
fn geometry_request_resizes_and_rescales() {
    let mut session = session_with(noisy(50, 40));
    let request = GeometryRequest {
        width: Some(96),
        height: Some(48),
        dpi: Some(48.0),
        ..Default::default()
    };
    let report = session.apply_geometry(&request, &JpegBackend::new()).unwrap();
    assert!(report.is_none());
    assert_eq!(session.working().unwrap().dimensions(), (48, 24));
}

// =============================================================================
// Reset
// =============================================================================

#[test]
fn reset_after_any_edits_restores_original() {
    let mut session = session_with(noisy(30, 20));
    session
        .apply_filters(FilterParameters {
            contrast: 180.0,
            invert: 100.0,
            ..Default::default()
        })
        .unwrap();
    session.rotate(17.0).unwrap();
    session.resize(11, 50).unwrap();
    session.rescale_to_dpi(300.0).unwrap();

    session.reset();
    assert_eq!(&working(&session), session.original().unwrap().pixels());
    assert_eq!(*session.params(), FilterParameters::default());
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn fixed_quality_export_is_decodable_jpeg() {
    let session = session_with(noisy(48, 32));
    let report = session
        .export(&ExportRequest::default(), &JpegBackend::new())
        .unwrap()
        .unwrap();
    assert_eq!(report.status, ExportStatus::FixedQuality);
    assert_eq!(report.artifact.quality, Quality::new(1.0));

    let decoded = rust_backend::decode_image(&report.artifact.bytes).unwrap();
    assert_eq!(decoded.dimensions(), (48, 32));
}

#[test]
fn export_dpi_scales_output_only() {
    let session = session_with(noisy(96, 64));
    let request = ExportRequest {
        target_kb: None,
        dpi: Some(48.0),
    };
    let report = session.export(&request, &JpegBackend::new()).unwrap().unwrap();
    let decoded = rust_backend::decode_image(&report.artifact.bytes).unwrap();
    assert_eq!(decoded.dimensions(), (48, 32));
    assert_eq!(session.working().unwrap().dimensions(), (96, 64));
}

#[test]
fn target_size_is_met_or_budget_spent() {
    let image = noisy(256, 256);
    let encoder = JpegBackend::new();
    let full = encoder.encode(&image, Quality::new(1.0)).unwrap().len() as u64;
    let session = session_with(image);

    for fraction in [0.25, 0.5, 0.8] {
        let target_kb = ((full as f64 * fraction) / 1024.0).max(1.0) as u32;
        let request = ExportRequest {
            target_kb: Some(target_kb),
            dpi: None,
        };
        let report = session.export(&request, &encoder).unwrap().unwrap();
        let target = target_kb as u64 * 1024;
        let within = (report.artifact.size() as u64).abs_diff(target) < 512;

        assert!(report.evaluations <= 31);
        assert!(
            within || report.evaluations == 31,
            "target {target}: got {} bytes after {} encodes",
            report.artifact.size(),
            report.evaluations
        );
        assert_eq!(within, report.status == ExportStatus::Converged);
    }
}

#[test]
fn unreachable_target_returns_best_effort() {
    let session = session_with(noisy(16, 16));
    let request = ExportRequest {
        target_kb: Some(10_000),
        dpi: None,
    };
    let report = session.export(&request, &JpegBackend::new()).unwrap().unwrap();
    assert_eq!(report.status, ExportStatus::BudgetExhausted);
    assert_eq!(report.evaluations, 31);
    assert!(!report.artifact.bytes.is_empty());
}

#[test]
fn default_config_round_trips_through_session() {
    let session = EditorSession::new(EditorConfig::default());
    assert_eq!(session.config().search.max_attempts, 30);
    assert!(!session.has_image());
}
