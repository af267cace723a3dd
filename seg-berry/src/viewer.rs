//! 切片浏览.
//!
//! [`FrameController`] 持有 "滑块" 状态: 取值范围 `[0, len - 1]`, 初始值和当前帧.
//! 每次改变当前帧后, 调用方通过 [`FrameController::current_image`] 取得新帧的图像.

use std::str::FromStr;

use thiserror::Error;

use crate::diff::DiffError;

/// 能按切片索引生成图像的数据源.
pub trait SliceSource {
    /// 单帧图像类型.
    type Frame;

    /// 切片个数.
    fn len(&self) -> usize;

    /// 是否不含任何切片.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 生成第 `z` 帧. `z` 越界时返回 `Err(DiffError::SliceOutOfRange)`.
    fn render(&self, z: usize) -> Result<Self::Frame, DiffError>;
}

/// 切片浏览错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    /// 数据源不含任何切片.
    #[error("cannot browse a volume with no slices")]
    EmptySource,
}

/// 浏览命令.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    /// 跳转到指定帧 (允许小数, 会被取整并截断到合法范围).
    Goto(f64),
    /// 下一帧.
    Next,
    /// 上一帧.
    Prev,
    /// 回到初始帧.
    Reset,
    /// 退出.
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "n" | "next" => Ok(Command::Next),
            "p" | "prev" => Ok(Command::Prev),
            "r" | "reset" => Ok(Command::Reset),
            "q" | "quit" => Ok(Command::Quit),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .map(Command::Goto)
                .ok_or_else(|| format!("unknown command `{other}`")),
        }
    }
}

/// 帧控制器.
#[derive(Debug, Clone)]
pub struct FrameController<S> {
    source: S,
    valinit: usize,
    frame: usize,
}

impl<S: SliceSource> FrameController<S> {
    /// 创建控制器, 当前帧为 `valinit` (截断到合法范围).
    ///
    /// `source` 不含任何切片时返回 `Err(ViewerError::EmptySource)`.
    pub fn new(source: S, valinit: usize) -> Result<Self, ViewerError> {
        if source.is_empty() {
            return Err(ViewerError::EmptySource);
        }
        let valinit = valinit.min(source.len() - 1);
        Ok(Self {
            source,
            valinit,
            frame: valinit,
        })
    }

    /// 最小帧, 恒为 0.
    #[inline]
    pub fn valmin(&self) -> usize {
        0
    }

    /// 最大帧, 即 `len - 1`.
    #[inline]
    pub fn valmax(&self) -> usize {
        self.source.len() - 1
    }

    /// 初始帧.
    #[inline]
    pub fn valinit(&self) -> usize {
        self.valinit
    }

    /// 当前帧.
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// 数据源.
    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// 将 `value` 四舍六入五成双后截断到 `[valmin, valmax]`, 作为当前帧.
    /// `value` 为 NaN 时当前帧不变. 返回新的当前帧.
    pub fn set(&mut self, value: f64) -> usize {
        if !value.is_nan() {
            let max = self.valmax() as f64;
            self.frame = value.round_ties_even().clamp(0.0, max) as usize;
        }
        self.frame
    }

    /// 将当前帧移动 `delta`, 截断到合法范围. 返回新的当前帧.
    pub fn step(&mut self, delta: isize) -> usize {
        self.frame = self
            .frame
            .saturating_add_signed(delta)
            .min(self.valmax());
        self.frame
    }

    /// 回到初始帧. 返回新的当前帧.
    #[inline]
    pub fn reset(&mut self) -> usize {
        self.frame = self.valinit;
        self.frame
    }

    /// 执行浏览命令. 返回新的当前帧, 收到 [`Command::Quit`] 时返回 `None`.
    pub fn apply(&mut self, command: Command) -> Option<usize> {
        let frame = match command {
            Command::Goto(v) => self.set(v),
            Command::Next => self.step(1),
            Command::Prev => self.step(-1),
            Command::Reset => self.reset(),
            Command::Quit => return None,
        };
        log::debug!("Frame -> {frame}");
        Some(frame)
    }

    /// 生成当前帧图像.
    #[inline]
    pub fn current_image(&self) -> Result<S::Frame, DiffError> {
        self.source.render(self.frame)
    }
}
