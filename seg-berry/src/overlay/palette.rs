//! 调色板: 标签到颜色的显式映射.

use std::collections::BTreeMap;

use crate::consts::rgb;
use crate::diff::{DiffError, LabelSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 三通道颜色.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// 完全不透明的 RGBA 表示.
    #[inline]
    pub const fn opaque(self) -> [u8; 4] {
        let [r, g, b] = self.0;
        [r, g, b, u8::MAX]
    }
}

/// 调色板耗尽 (存在无法取色的标签) 时的处理策略.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// 返回 `Err(DiffError::ColorTableExhausted)`.
    #[default]
    Strict,

    /// 以中性灰 [`rgb::NEUTRAL`] 着色, 并记录一条警告.
    Neutral,
}

/// 单层调色板.
///
/// 取色优先级: 显式映射 `labels` > 按秩颜色表 `ranked` > 回退色 `fallback`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Palette {
    /// 按标签秩 (在标签集合中的位置) 取色的颜色表.
    pub ranked: Vec<Rgb>,

    /// 显式的 `标签 -> 颜色` 映射.
    pub labels: BTreeMap<u8, Rgb>,

    /// 前两者均无法取色时使用的颜色.
    pub fallback: Option<Rgb>,
}

impl Palette {
    /// 仅包含按秩颜色表的调色板.
    #[inline]
    pub fn ranked<I: IntoIterator<Item = Rgb>>(colors: I) -> Self {
        Self {
            ranked: colors.into_iter().collect(),
            ..Default::default()
        }
    }

    /// 增加一条显式映射.
    #[inline]
    pub fn with_label(mut self, label: u8, color: Rgb) -> Self {
        self.labels.insert(label, color);
        self
    }

    /// 设置回退色.
    #[inline]
    pub fn with_fallback(mut self, color: Rgb) -> Self {
        self.fallback = Some(color);
        self
    }

    /// 获取 `label` (秩为 `rank`) 的颜色. 无法取色时返回 `None`.
    pub fn color_of(&self, label: u8, rank: usize) -> Option<Rgb> {
        self.labels
            .get(&label)
            .or_else(|| self.ranked.get(rank))
            .copied()
            .or(self.fallback)
    }

    /// 按照 `labels` 的顺序为每个标签取色.
    ///
    /// 存在无法取色的标签时:
    ///
    /// - `FallbackPolicy::Strict` 返回 `Err(DiffError::ColorTableExhausted)`;
    /// - `FallbackPolicy::Neutral` 为其分配中性灰, 并记录警告.
    pub fn resolve(&self, labels: &LabelSet, policy: FallbackPolicy) -> Result<Vec<Rgb>, DiffError> {
        let colors: Vec<Option<Rgb>> = labels
            .iter()
            .enumerate()
            .map(|(rank, l)| self.color_of(l, rank))
            .collect();
        let unmapped: Vec<u8> = labels
            .iter()
            .zip(colors.iter())
            .filter_map(|(l, c)| c.is_none().then_some(l))
            .collect();

        if unmapped.is_empty() {
            return Ok(colors.into_iter().flatten().collect());
        }
        match policy {
            FallbackPolicy::Strict => Err(DiffError::ColorTableExhausted {
                labels: labels.len(),
                colors: labels.len() - unmapped.len(),
            }),
            FallbackPolicy::Neutral => {
                log::warn!(
                    "No color configured for labels {unmapped:?}; falling back to neutral gray"
                );
                Ok(colors
                    .into_iter()
                    .map(|c| c.unwrap_or(rgb::NEUTRAL))
                    .collect())
            }
        }
    }
}

/// 一次比对所用的全部调色板.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct Palettes {
    /// 真值层与仅真值层.
    pub truth: Palette,

    /// 计算层与仅计算层.
    pub computed: Palette,

    /// 交集层.
    pub intersection: Palette,
}

impl Default for Palettes {
    /// 真值蓝色系, 计算红色系, 交集紫色系, 各三种颜色.
    fn default() -> Self {
        Self {
            truth: Palette::ranked(rgb::BLUES),
            computed: Palette::ranked(rgb::REDS),
            intersection: Palette::ranked(rgb::PURPLES),
        }
    }
}

/// 调色板配置错误.
#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    /// 为背景标签 `0` 配置了颜色.
    #[error("palette `{0}` maps background label 0 to a color")]
    BackgroundColor(&'static str),

    /// 读取配置文件失败.
    #[error("cannot read palette file: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件格式错误.
    #[cfg(feature = "serde")]
    #[error("invalid palette file: {0}")]
    Json(#[from] serde_json::Error),
}

impl Palettes {
    /// 检查配置合法性. 背景标签不允许着色.
    pub fn validate(&self) -> Result<(), PaletteError> {
        for (name, p) in [
            ("truth", &self.truth),
            ("computed", &self.computed),
            ("intersection", &self.intersection),
        ] {
            if p.labels.contains_key(&crate::consts::gray::BACKGROUND) {
                return Err(PaletteError::BackgroundColor(name));
            }
        }
        Ok(())
    }

    /// 从 JSON 配置文件读取并检查调色板. 缺省的字段使用默认值.
    ///
    /// ```json
    /// {
    ///     "truth": { "ranked": [[0, 0, 255]], "labels": { "7": [0, 255, 255] } },
    ///     "computed": { "fallback": [255, 0, 0] }
    /// }
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, PaletteError> {
        let file = std::fs::File::open(path)?;
        let palettes: Palettes = serde_json::from_reader(std::io::BufReader::new(file))?;
        palettes.validate()?;
        Ok(palettes)
    }
}
