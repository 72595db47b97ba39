use clap::{Parser, Subcommand};
use retouch::imaging::{
    ExportRequest, FilterParameters, GeometryRequest, JpegBackend, LossyEncoder, OverlayColor,
    rust_backend,
};
use retouch::config;
use retouch::output::{self, ExportSummary};
use retouch::session::EditorSession;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Tonal filter flags. Percent values; 100 is neutral for brightness,
/// contrast and saturate, 0 for the rest.
#[derive(clap::Args, Clone)]
struct FilterArgs {
    /// Brightness in percent
    #[arg(long, default_value_t = 100.0)]
    brightness: f32,
    /// Contrast in percent
    #[arg(long, default_value_t = 100.0)]
    contrast: f32,
    /// Grayscale amount in percent (0-100)
    #[arg(long, default_value_t = 0.0)]
    grayscale: f32,
    /// Sepia amount in percent (0-100)
    #[arg(long, default_value_t = 0.0)]
    sepia: f32,
    /// Invert amount in percent (0-100)
    #[arg(long, default_value_t = 0.0)]
    invert: f32,
    /// Hue rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    hue_rotate: f32,
    /// Saturation in percent
    #[arg(long, default_value_t = 100.0)]
    saturate: f32,
    /// Overlay color as #rrggbb or #rgb (white = none)
    #[arg(long, value_parser = parse_overlay)]
    overlay: Option<OverlayColor>,
}

impl FilterArgs {
    fn to_params(&self) -> FilterParameters {
        FilterParameters {
            brightness: self.brightness,
            contrast: self.contrast,
            grayscale: self.grayscale,
            sepia: self.sepia,
            invert: self.invert,
            hue_rotate: self.hue_rotate,
            saturate: self.saturate,
            overlay: self.overlay,
        }
    }
}

/// Geometry and export flags.
#[derive(clap::Args, Clone)]
struct GeometryArgs {
    /// Resize to this width (needs --height; ignored with --target-kb)
    #[arg(long, requires = "height")]
    width: Option<u32>,
    /// Resize to this height (needs --width; ignored with --target-kb)
    #[arg(long, requires = "width")]
    height: Option<u32>,
    /// Rotate clockwise by this many degrees
    #[arg(long, allow_negative_numbers = true)]
    rotate: Option<f64>,
    /// Rescale by DPI / 96
    #[arg(long)]
    dpi: Option<f64>,
    /// Search for a JPEG quality that lands near this many kilobytes
    #[arg(long)]
    target_kb: Option<u32>,
}

fn parse_overlay(value: &str) -> Result<OverlayColor, String> {
    OverlayColor::parse_hex(value).ok_or_else(|| format!("invalid color '{value}', expected #rrggbb"))
}

#[derive(Parser)]
#[command(name = "retouch")]
#[command(about = "Filter, transform and size-target raster images")]
#[command(long_about = "\
Filter, transform and size-target raster images

Filters are applied in a fixed order: brightness, contrast, grayscale, sepia,
invert, hue-rotate, saturate, then the overlay color. Geometry is applied
after filters: resize, rotate, DPI rescale.

With --target-kb the JPEG quality is chosen by bisection so the output lands
within 512 bytes of the target. If that is not reachable in 31 encodes the
last attempt is written anyway and the summary says so.

Set RUST_LOG=debug to see every search step.

Run 'retouch gen-config' to generate a documented retouch.toml.")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Edit one image and write it as JPEG
    Edit {
        /// Input image (JPEG, PNG, TIFF or WebP)
        input: PathBuf,
        /// Output file [default: edited_image.jpg]
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock retouch.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Edit {
            input,
            output: output_path,
            filters,
            geometry,
            json,
        } => {
            if !rust_backend::is_supported_input(&input) {
                return Err(format!(
                    "unsupported input '{}': expected one of {}",
                    input.display(),
                    rust_backend::supported_input_extensions().join(", ")
                )
                .into());
            }
            let editor_config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&editor_config.processing);

            let image = rust_backend::load_image(&input)?;
            let mut session = EditorSession::new(editor_config);
            session.load(image);
            session.apply_filters(filters.to_params())?;

            // Geometry without the search: the export below runs it, with progress.
            let export = ExportRequest {
                target_kb: geometry.target_kb,
                dpi: None,
            };
            let resize = export.target_kb().is_none();
            let request = GeometryRequest {
                width: geometry.width.filter(|_| resize),
                height: geometry.height.filter(|_| resize),
                target_kb: None,
                rotate_degrees: geometry.rotate,
                dpi: geometry.dpi,
            };
            let encoder = Arc::new(JpegBackend::new());
            let output_path =
                output_path.unwrap_or_else(|| output::default_output_path(encoder.extension()));
            session.apply_geometry(&request, encoder.as_ref())?;

            let Some(task) = session.spawn_export(&export, encoder.clone())? else {
                return Err("no image loaded".into());
            };
            for event in &task.events {
                if !json {
                    for line in output::format_search_event(&event) {
                        println!("{}", line);
                    }
                }
            }
            let report = task.wait()?;

            std::fs::write(&output_path, &report.artifact.bytes)?;
            let dimensions = session
                .working()
                .map(|w| w.dimensions())
                .unwrap_or_default();
            let summary =
                ExportSummary::new(&report, &output_path, encoder.mime_type(), dimensions);
            output::print_export_summary(&summary, json)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
