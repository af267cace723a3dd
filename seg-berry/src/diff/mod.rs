//! 分割差异计算.
//!
//! 对标签集合中的每个标签, 分别从真值分割和计算分割中取出该标签的掩码,
//! 再将二者划分为交集、仅真值、仅计算三部分. 所有操作都是纯函数,
//! 结果在创建后只读.

use ndarray::{Array, ArrayView, ArrayView3, Dimension, Ix3, ShapeError, Zip};
use thiserror::Error;

/// 差异计算与叠加编码的错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiffError {
    /// 两份数据形状不一致. 该错误不可恢复, 必须在展示前终止.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 参照形状 (通常是真值分割).
        expected: Vec<usize>,
        /// 实际形状.
        found: Vec<usize>,
    },

    /// 标签个数多于调色板可提供的颜色个数.
    #[error("color table exhausted: {labels} labels but only {colors} colors")]
    ColorTableExhausted {
        /// 需要着色的标签个数.
        labels: usize,
        /// 可用颜色个数.
        colors: usize,
    },

    /// 无透明通道时标签被着色为白色, 与背景填充无法区分.
    #[error("label {label} is colored white, which is the background fill without alpha")]
    ReservedColor {
        /// 着色为白色的标签.
        label: u8,
    },

    /// 切片索引越界.
    #[error("slice index {z} out of range 0..{len}")]
    SliceOutOfRange {
        /// 请求的切片索引.
        z: usize,
        /// 切片总数.
        len: usize,
    },

    /// 数组布局转换失败.
    #[error("array layout error: {0}")]
    Layout(#[from] ShapeError),
}

/// 检查两个形状是否一致.
#[inline]
pub(crate) fn check_shape(expected: &[usize], found: &[usize]) -> Result<(), DiffError> {
    if expected == found {
        Ok(())
    } else {
        Err(DiffError::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        })
    }
}

/// 标签集合: 升序、去重, 且不含背景 `0`.
///
/// 标签在集合中的位置 (秩) 即为其在按序调色板中的颜色索引.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet(Vec<u8>);

impl LabelSet {
    /// 从任意标签序列构建集合. 背景值会被忽略.
    ///
    /// 单次遍历, 只借助一张 256 项的出现表.
    pub fn from_labels<I: IntoIterator<Item = u8>>(it: I) -> Self {
        let mut present = [false; 256];
        for l in it {
            present[usize::from(l)] = true;
        }
        Self(
            (u8::MIN..=u8::MAX)
                .filter(|&l| present[usize::from(l)] && crate::consts::gray::is_foreground(l))
                .collect(),
        )
    }

    /// 以升序切片形式获取所有标签.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// 标签个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 是否为空集 (即真值中没有任何前景).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按升序迭代标签.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// 是否包含 `label`.
    #[inline]
    pub fn contains(&self, label: u8) -> bool {
        self.rank_of(label).is_some()
    }

    /// `label` 在集合中的秩 (从 0 开始). 不存在时返回 `None`.
    #[inline]
    pub fn rank_of(&self, label: u8) -> Option<usize> {
        self.0.binary_search(&label).ok()
    }

    /// 与 `other` 的并集.
    pub fn union(&self, other: &LabelSet) -> LabelSet {
        Self::from_labels(self.iter().chain(other.iter()))
    }
}

/// 标签集合的来源策略.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LabelSetPolicy {
    /// 仅取真值分割中出现的标签. 只出现在计算分割中的标签会被忽略.
    #[default]
    TruthOnly,

    /// 取真值与计算分割标签的并集.
    Union,
}

/// 获取 `truth` 的标签集合: 升序、去重、去背景.
///
/// 对同一输入重复调用总是得到相同的序列.
#[inline]
pub fn label_set<D: Dimension>(truth: ArrayView<u8, D>) -> LabelSet {
    LabelSet::from_labels(truth.iter().copied())
}

/// 按照 `policy` 获取标签集合.
pub fn label_set_with<D: Dimension>(
    truth: ArrayView<u8, D>,
    computed: ArrayView<u8, D>,
    policy: LabelSetPolicy,
) -> LabelSet {
    let truth_labels = label_set(truth);
    match policy {
        LabelSetPolicy::TruthOnly => truth_labels,
        LabelSetPolicy::Union => truth_labels.union(&label_set(computed)),
    }
}

/// 获取 `volume == label` 的掩码, 形状与 `volume` 一致.
#[inline]
pub fn label_mask<D: Dimension>(volume: ArrayView<u8, D>, label: u8) -> Array<bool, D> {
    volume.mapv(|v| v == label)
}

/// 单个标签的差异掩码. 三者两两不相交, 且并集等于 `truth | computed`.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffMasks<D: Dimension> {
    /// 真值与计算均为该标签.
    pub intersection: Array<bool, D>,

    /// 仅真值为该标签.
    pub truth_only: Array<bool, D>,

    /// 仅计算为该标签.
    pub computed_only: Array<bool, D>,
}

impl<D: Dimension> DiffMasks<D> {
    /// 真值掩码, 即 `truth_only | intersection`.
    #[inline]
    pub fn truth(&self) -> Array<bool, D> {
        &self.truth_only | &self.intersection
    }

    /// 计算掩码, 即 `computed_only | intersection`.
    #[inline]
    pub fn computed(&self) -> Array<bool, D> {
        &self.computed_only | &self.intersection
    }

    /// 三类掩码的并集, 即 `truth | computed`.
    #[inline]
    pub fn covered(&self) -> Array<bool, D> {
        &(&self.truth_only | &self.computed_only) | &self.intersection
    }
}

/// 由同一标签的真值掩码和计算掩码求差异掩码.
///
/// - `intersection = truth AND computed`
/// - `truth_only = truth AND NOT intersection`
/// - `computed_only = computed AND NOT intersection`
///
/// 形状不一致时返回 `Err(DiffError::ShapeMismatch)`.
pub fn diff_for_label<D: Dimension>(
    truth_mask: ArrayView<bool, D>,
    computed_mask: ArrayView<bool, D>,
) -> Result<DiffMasks<D>, DiffError> {
    check_shape(truth_mask.shape(), computed_mask.shape())?;

    let intersection = Zip::from(&truth_mask)
        .and(&computed_mask)
        .map_collect(|&t, &c| t && c);
    let truth_only = Zip::from(&truth_mask)
        .and(&intersection)
        .map_collect(|&t, &i| t && !i);
    let computed_only = Zip::from(&computed_mask)
        .and(&intersection)
        .map_collect(|&c, &i| c && !i);

    Ok(DiffMasks {
        intersection,
        truth_only,
        computed_only,
    })
}

/// 一对 3D 分割的逐标签差异. 创建后只读, 随后按切片索引供展示使用.
#[derive(Clone, Debug)]
pub struct SegDiff {
    labels: LabelSet,
    masks: Vec<DiffMasks<Ix3>>,
    shape: [usize; 3],
}

impl SegDiff {
    /// 计算 `truth` 与 `computed` 的逐标签差异.
    ///
    /// 形状不一致时, 在分配任何掩码前返回 `Err(DiffError::ShapeMismatch)`.
    /// 标签集合为空不是错误: 此时结果不含任何标签, 所有叠加图均为背景填充.
    pub fn compute(
        truth: ArrayView3<u8>,
        computed: ArrayView3<u8>,
        policy: LabelSetPolicy,
    ) -> Result<Self, DiffError> {
        check_shape(truth.shape(), computed.shape())?;

        let labels = label_set_with(truth.view(), computed.view(), policy);
        if labels.is_empty() {
            log::warn!("Truth segmentation has no foreground labels; overlays will be empty");
        } else {
            log::info!("Computing diff masks for labels {:?}", labels.as_slice());
        }

        let masks = labels
            .iter()
            .map(|l| {
                let t = label_mask(truth.view(), l);
                let c = label_mask(computed.view(), l);
                diff_for_label(t.view(), c.view())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (z, h, w) = truth.dim();
        Ok(Self {
            labels,
            masks,
            shape: [z, h, w],
        })
    }

    /// 标签集合.
    #[inline]
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// 数据形状 (z, h, w).
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// 水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape[0]
    }

    /// 获取 `label` 的差异掩码. 标签不在集合中时返回 `None`.
    #[inline]
    pub fn get(&self, label: u8) -> Option<&DiffMasks<Ix3>> {
        self.labels.rank_of(label).map(|r| &self.masks[r])
    }

    /// 按标签升序迭代 `(标签, 差异掩码)`.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u8, &DiffMasks<Ix3>)> {
        self.labels.iter().zip(self.masks.iter())
    }
}
