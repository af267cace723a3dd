//! 帧导出.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::diff::DiffError;
use crate::viewer::SliceSource;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 帧渲染与导出错误.
#[derive(Debug, Error)]
pub enum RenderError {
    /// 渲染失败.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// 无法创建输出目录.
    #[error("cannot create {path}: {source}")]
    Io {
        /// 目标目录.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 无法写出图像.
    #[error("cannot write {path}: {source}")]
    Image {
        /// 目标文件.
        path: PathBuf,
        /// 底层错误.
        source: image::ImageError,
    },
}

/// 第 `z` 帧 (从 0 开始) 的文件名: `{basename}_frame-{NNN}.png`, 其中序号从 1 开始.
#[inline]
pub fn frame_file_name(basename: &str, z: usize) -> String {
    format!("{basename}_frame-{:03}.png", z + 1)
}

fn save_one<S>(source: &S, dir: &Path, basename: &str, z: usize) -> Result<PathBuf, RenderError>
where
    S: SliceSource<Frame = RgbaImage> + ?Sized,
{
    let path = dir.join(frame_file_name(basename, z));
    source
        .render(z)?
        .save(&path)
        .map_err(|source| RenderError::Image {
            path: path.clone(),
            source,
        })?;
    log::debug!("Saved {}", path.display());
    Ok(path)
}

fn create_dir(dir: &Path) -> Result<(), RenderError> {
    fs::create_dir_all(dir).map_err(|source| RenderError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// 依次渲染 `frames` 中的每一帧, 保存到 `dir` 下. 返回写出的文件路径.
///
/// `dir` 不存在时会被创建.
pub fn save_frames<S>(
    source: &S,
    dir: &Path,
    basename: &str,
    frames: &[usize],
) -> Result<Vec<PathBuf>, RenderError>
where
    S: SliceSource<Frame = RgbaImage> + ?Sized,
{
    create_dir(dir)?;
    let paths = frames
        .iter()
        .map(|&z| save_one(source, dir, basename, z))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("Saved {} frames to {}", paths.len(), dir.display());
    Ok(paths)
}

/// 借助 `rayon`, 并行地渲染并保存 `frames` 中的每一帧. 返回的路径与 `frames` 顺序一致.
#[cfg(feature = "rayon")]
pub fn par_save_frames<S>(
    source: &S,
    dir: &Path,
    basename: &str,
    frames: &[usize],
) -> Result<Vec<PathBuf>, RenderError>
where
    S: SliceSource<Frame = RgbaImage> + Sync + ?Sized,
{
    create_dir(dir)?;
    let paths = frames
        .par_iter()
        .map(|&z| save_one(source, dir, basename, z))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("Saved {} frames to {}", paths.len(), dir.display());
    Ok(paths)
}
