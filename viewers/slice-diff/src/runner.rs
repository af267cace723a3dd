//! 程序运行函数.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use seg_berry::consts::OVERLAY_ALPHA;
use seg_berry::diff::LabelSetPolicy;
use seg_berry::overlay::{FallbackPolicy, Overlays, Palettes};
use seg_berry::render::{self, FrameRenderer, RenderOptions};
use seg_berry::viewer::{Command, FrameController, SliceSource};
use seg_berry::Study;
use utils::loader::{self, StudyPaths};

use crate::result::RunSummary;
use crate::Cli;

/// 实际运行.
pub fn run(cli: &Cli) -> Result<RunSummary> {
    ensure!(
        (0.0..=1.0).contains(&cli.alpha),
        "--alpha must be within [0, 1], got {}",
        cli.alpha
    );

    let paths = StudyPaths::resolve(
        &cli.data_folder,
        &cli.volume_filename,
        &cli.true_segmentation_filename,
        &cli.computed_segmentation_filename,
    )?;
    let study = Study::open(&paths.volume, &paths.truth, &paths.computed)
        .with_context(|| format!("Failed to load study from {}", cli.data_folder.display()))?;

    let palettes = match &cli.palette {
        Some(p) => Palettes::from_json_file(p)
            .with_context(|| format!("Failed to load palette {}", p.display()))?,
        None => Palettes::default(),
    };
    let policy = if cli.union_labels {
        LabelSetPolicy::Union
    } else {
        LabelSetPolicy::TruthOnly
    };
    let fallback = if cli.fallback_colors {
        FallbackPolicy::Neutral
    } else {
        FallbackPolicy::Strict
    };

    let diff = study.diff(policy)?;
    let mut summary = RunSummary::from_diff(&diff);
    let overlays = Overlays::new(diff, &palettes, fallback, !cli.no_alpha)
        .context("Failed to assign label colors")?;

    let options = RenderOptions {
        layout: cli.layout,
        window: utils::pick_window(cli.level, cli.width, cli.auto_window, &study.volume)?,
        diff_alpha: cli.alpha,
        overlay_alpha: OVERLAY_ALPHA,
    };
    let renderer = FrameRenderer::new(&study.volume, &overlays, options)?;
    let basename = loader::basename(&paths.volume);

    summary.frames = if cli.interactive {
        browse(renderer, cli.frame.unwrap_or(0), &cli.output, &basename)?
    } else {
        let frames: Vec<usize> = match cli.frame {
            Some(z) => {
                ensure!(
                    z < renderer.len(),
                    "--frame {z} is out of range 0..{}",
                    renderer.len()
                );
                vec![z]
            }
            None => (0..renderer.len()).collect(),
        };
        println!("Rendering {} frames...", frames.len());
        render::par_save_frames(&renderer, &cli.output, &basename, &frames)?
    };
    Ok(summary)
}

/// 从标准输入读取浏览命令, 每次切换帧后导出当前帧. 返回导出的所有文件.
fn browse(
    renderer: FrameRenderer,
    valinit: usize,
    dir: &Path,
    basename: &str,
) -> Result<Vec<PathBuf>> {
    let mut controller = FrameController::new(renderer, valinit)?;
    let mut written = render::save_frames(controller.source(), dir, basename, &[controller.frame()])?;

    println!(
        "Frames {}..={}, showing {}. Commands: <frame>, n, p, r, q",
        controller.valmin(),
        controller.valmax(),
        controller.frame()
    );
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        let Some(frame) = controller.apply(command) else {
            break;
        };
        let paths = render::save_frames(controller.source(), dir, basename, &[frame])?;
        for p in paths.iter() {
            println!("Frame {frame} -> {}", p.display());
        }
        written.extend(paths);
    }
    written.sort_unstable();
    written.dedup();
    Ok(written)
}
