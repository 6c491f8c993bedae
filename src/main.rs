//! filatrack CLI — filament tracking and two-channel enrichment quantification.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use filatrack::pipeline::{ChannelStack, EnrichmentConfig, EnrichmentPipeline, Gray16Frame, Region};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "filatrack")]
#[command(
    about = "Track segmented filaments across a time-lapse stack and quantify per-filament ABP/actin enrichment ratios"
)]
#[command(version)]
struct Cli {
    /// Path to the segmented region list (JSON array of regions).
    #[arg(long)]
    regions: PathBuf,

    /// Directory of actin-channel slices, one 16-bit grayscale image per
    /// frame, ordered by filename.
    #[arg(long)]
    actin: PathBuf,

    /// Directory of ABP-channel slices, co-registered with the actin stack.
    #[arg(long)]
    abp: PathBuf,

    /// Directory of label-mask slices (zero = background).
    #[arg(long)]
    labels: PathBuf,

    /// Output directory for the CSV and region-set artifacts.
    #[arg(long)]
    out: PathBuf,

    /// Basename prefix for every output artifact.
    #[arg(long, default_value = "filatrack")]
    stem: String,

    /// Skip tracking and report per-frame intensities only.
    #[arg(long)]
    no_tracking: bool,

    /// Side length of the square background window in pixels (must be even).
    #[arg(long, default_value = "60")]
    box_dim: u32,

    /// Maximum centroid displacement in pixels for a cross-frame match.
    #[arg(long, default_value = "25.0")]
    threshold: f64,

    /// Minimum number of matched frame-pairs for a track to be reported.
    #[arg(long, default_value = "10")]
    min_consecutive: u32,

    /// Tracks with an average area at or above this are excluded.
    #[arg(long, default_value = "1000.0")]
    max_area: f64,

    /// Minimum particle size in pixels recorded with the run configuration.
    #[arg(long, default_value = "100.0")]
    min_particle_size: f64,

    /// Normalize the ABP channel as foreground/background instead of
    /// foreground - background.
    #[arg(long)]
    ratio_background: bool,

    /// Count zero-valued ratio samples in the standard deviation.
    #[arg(long)]
    sd_include_zero_ratios: bool,
}

fn load_regions(path: &Path) -> CliResult<Vec<Region>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let regions: Vec<Region> = serde_json::from_str(&raw)
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))?;
    Ok(regions)
}

/// Loads a channel stack from a directory of image files, one slice per
/// frame, ordered by filename.
fn load_stack(name: &str, dir: &Path) -> CliResult<ChannelStack> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| format!("cannot read {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut slices: Vec<Gray16Frame> = Vec::with_capacity(paths.len());
    for path in &paths {
        let img = image::open(path)
            .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
        slices.push(img.to_luma16());
    }
    if slices.is_empty() {
        return Err(format!("no image slices found in {}", dir.display()).into());
    }
    tracing::info!("{name} stack: {} slices from {}", slices.len(), dir.display());
    Ok(ChannelStack::new(name, slices))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = EnrichmentConfig {
        tracking: !cli.no_tracking,
        background_box_dim: cli.box_dim,
        tracking_threshold: cli.threshold,
        min_consecutive_appearances: cli.min_consecutive,
        max_filament_area: cli.max_area,
        min_particle_size: cli.min_particle_size,
        ratio_background: cli.ratio_background,
        sd_excludes_zero_ratios: !cli.sd_include_zero_ratios,
    };
    let pipeline = EnrichmentPipeline::new(config)?;

    let regions = load_regions(&cli.regions)?;
    tracing::info!("Loaded {} segmented regions", regions.len());

    let actin = load_stack("actin", &cli.actin)?;
    let abp = load_stack("abp", &cli.abp)?;
    let labels = load_stack("labels", &cli.labels)?;

    let output = pipeline.run(regions, &actin, &abp, &labels)?;
    if output.excluded_border_regions > 0 {
        tracing::warn!(
            "{} regions dropped at the image border",
            output.excluded_border_regions
        );
    }
    if let Some(summary) = &output.summary {
        tracing::info!(
            "{} filaments tracked, {} included in the report",
            summary.filament_count,
            summary.included_tracks().count()
        );
    }

    fs::create_dir_all(&cli.out)
        .map_err(|e| format!("cannot create {}: {e}", cli.out.display()))?;
    let written = output.write_artifacts(&cli.out, &cli.stem)?;
    for path in &written {
        tracing::info!("Wrote {}", path.display());
    }
    Ok(())
}
