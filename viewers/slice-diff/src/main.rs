//! slice-diff: 逐切片比对真值分割与计算分割, 导出差异帧或交互式浏览.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use seg_berry::consts::DIFF_ALPHA;
use seg_berry::render::Layout;

mod result;
mod runner;

/// Compare a computed segmentation against the ground truth, slice by slice
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Folder holding the volume and segmentation files
    #[arg(value_name = "DATA_FOLDER")]
    pub data_folder: PathBuf,

    /// Volume file, e.g. volume_14.mhd (`.mhd` is implied without an extension)
    pub volume_filename: String,

    /// Ground-truth segmentation file, e.g. segmentation_14.mhd
    pub true_segmentation_filename: String,

    /// Computed segmentation file
    pub computed_segmentation_filename: String,

    /// Frame layout: diff, grid or overlay
    #[arg(long, default_value_t = Layout::Diff)]
    pub layout: Layout,

    /// Render only this frame (0-based); all frames when not set
    #[arg(long, value_name = "N")]
    pub frame: Option<usize>,

    /// Browse frames from stdin: a frame number, n(ext), p(rev), r(eset) or q(uit)
    #[arg(short, long)]
    pub interactive: bool,

    /// Output directory for PNG frames
    #[arg(short, long, value_name = "DIR", default_value = "frames")]
    pub output: PathBuf,

    /// Window level (default: 100)
    #[arg(long, allow_hyphen_values = true)]
    pub level: Option<f32>,

    /// Window width (default: 750)
    #[arg(long)]
    pub width: Option<f32>,

    /// Derive the window from the intensity range of the volume
    #[arg(long, conflicts_with_all = ["level", "width"])]
    pub auto_window: bool,

    /// Opacity of the intersection, truth-only and computed-only layers
    #[arg(long, default_value_t = DIFF_ALPHA)]
    pub alpha: f32,

    /// JSON palette file with `truth`, `computed` and `intersection` palettes
    #[arg(long, value_name = "FILE")]
    pub palette: Option<PathBuf>,

    /// Color labels without a configured color in neutral gray instead of failing
    #[arg(long)]
    pub fallback_colors: bool,

    /// Also diff labels that only appear in the computed segmentation
    #[arg(long)]
    pub union_labels: bool,

    /// Encode overlays as RGB with a white background instead of RGBA
    #[arg(long)]
    pub no_alpha: bool,

    /// Number of export threads (default: all cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logger(cli.verbose).context("Failed to initialize logger")?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs.unwrap_or_else(utils::cpus))
        .build_global()
        .context("Failed to build thread pool")?;

    let summary = runner::run(&cli)?;
    summary.analyze().context("Failed to print summary")?;
    Ok(())
}
