//! 浏览工具依赖的通用组件.

use std::path::PathBuf;

use log::LevelFilter;
use seg_berry::{IntensityWindow, Volume};
use simple_logger::SimpleLogger;
use thiserror::Error;

pub mod loader;

/// 分隔线文本.
pub const SEP: &str = "--------------------------------------------------------";

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 命令行输入错误.
#[derive(Debug, Error)]
pub enum InputError {
    /// 输入文件不存在.
    #[error("missing input files: {}", display_paths(.0))]
    MissingFiles(Vec<PathBuf>),

    /// 窗位或窗宽超出合理范围.
    #[error("invalid intensity window: level {level}, width {width}")]
    InvalidWindow {
        /// 窗位.
        level: f32,
        /// 窗宽.
        width: f32,
    },

    /// 无法从强度范围推导窗口 (例如常数体数据).
    #[error("cannot derive an intensity window from range {0:?}")]
    DegenerateRange(Option<(f32, f32)>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 按照 `-v` 的个数初始化日志: 0 为 warn, 1 为 info, 2 及以上为 debug.
pub fn init_logger(verbose: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new().with_level(level).init()
}

/// 选择强度窗口.
///
/// 1. `auto` 为真时, 由 `volume` 的强度范围推导;
/// 2. 否则使用 `level` 和 `width`, 缺省值取窗位 100, 窗宽 750.
pub fn pick_window(
    level: Option<f32>,
    width: Option<f32>,
    auto: bool,
    volume: &Volume,
) -> Result<IntensityWindow, InputError> {
    if auto {
        let range = volume.value_range();
        return range
            .and_then(|(lo, hi)| IntensityWindow::from_range(lo, hi))
            .ok_or(InputError::DegenerateRange(range));
    }
    let preset = IntensityWindow::from_ct_visual();
    let (level, width) = (
        level.unwrap_or(preset.level()),
        width.unwrap_or(preset.width()),
    );
    IntensityWindow::new(level, width).ok_or(InputError::InvalidWindow { level, width })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume(lo: f32, hi: f32) -> Volume {
        let mut data = Array3::from_elem((1, 2, 2), lo);
        data[(0, 1, 1)] = hi;
        Volume::new(data, [1.0; 3], [0.0; 3]).unwrap()
    }

    #[test]
    fn test_pick_window() {
        let v = volume(-1000.0, 1000.0);
        assert_eq!(
            pick_window(None, None, false, &v).unwrap(),
            IntensityWindow::from_ct_visual()
        );
        let w = pick_window(Some(40.0), None, false, &v).unwrap();
        assert_eq!((w.level(), w.width()), (40.0, 750.0));

        let auto = pick_window(Some(40.0), None, true, &v).unwrap();
        assert_eq!((auto.lower_bound(), auto.upper_bound()), (-1000.0, 1000.0));

        assert!(matches!(
            pick_window(None, Some(-5.0), false, &v),
            Err(InputError::InvalidWindow { .. })
        ));
        assert!(matches!(
            pick_window(None, None, true, &volume(3.0, 3.0)),
            Err(InputError::DegenerateRange(r)) if r == Some((3.0, 3.0))
        ));
    }

    #[test]
    fn test_missing_files_message() {
        let e = InputError::MissingFiles(vec![PathBuf::from("a.mhd"), PathBuf::from("b.mhd")]);
        assert_eq!(e.to_string(), "missing input files: a.mhd, b.mhd");
    }
}
