//! 叠加图编码.
//!
//! 将一组布尔掩码与对应颜色合成为一张 RGB(A) 叠加图, 其形状为掩码形状后追加通道轴.
//! 一次比对的五层叠加图 (真值, 计算, 交集, 仅真值, 仅计算) 由 [`Overlays`] 按切片提供.

use ndarray::{Array, Array2, Array3, ArrayView, Axis, Dimension, Ix2, Ix3};

use crate::consts::{rgb, RGBA_CHANNELS, RGB_CHANNELS};
use crate::diff::{check_shape, DiffError, DiffMasks, SegDiff};

mod palette;

pub use palette::{FallbackPolicy, Palette, PaletteError, Palettes, Rgb};

/// 将 `masks` 按 `colors` 着色, 合成一张叠加图.
///
/// - 结果形状为 `dim` 后追加通道轴, 通道数为 4 (`with_alpha`) 或 3.
/// - 未被任何掩码覆盖的像素: 有透明通道时为 `[0, 0, 0, 0]`, 否则为白色.
/// - 被第 `i` 个掩码覆盖的像素取 `colors[i]`, 透明通道为 255.
/// - 多个掩码重叠时, 靠后的掩码覆盖靠前的.
///
/// 颜色不足时返回 `Err(DiffError::ColorTableExhausted)`,
/// 任一掩码形状与 `dim` 不一致时返回 `Err(DiffError::ShapeMismatch)`.
/// 掩码为空时得到一张背景叠加图.
pub fn encode_overlay<D: Dimension>(
    dim: D,
    masks: &[ArrayView<bool, D>],
    colors: &[Rgb],
    with_alpha: bool,
) -> Result<Array<u8, D::Larger>, DiffError> {
    if colors.len() < masks.len() {
        return Err(DiffError::ColorTableExhausted {
            labels: masks.len(),
            colors: colors.len(),
        });
    }
    for m in masks {
        check_shape(dim.slice(), m.shape())?;
    }

    let channels = if with_alpha {
        RGBA_CHANNELS
    } else {
        RGB_CHANNELS
    };
    let fill = if with_alpha {
        [0; RGBA_CHANNELS]
    } else {
        rgb::WHITE.opaque()
    };

    // (像素, 通道), 像素按逻辑顺序展平.
    let mut buf = Array2::from_shape_fn((dim.size(), channels), |(_, c)| fill[c]);
    for (mask, color) in masks.iter().zip(colors) {
        let px = color.opaque();
        buf.rows_mut()
            .into_iter()
            .zip(mask.iter())
            .filter(|(_, covered)| **covered)
            .for_each(|(mut row, _)| {
                row.iter_mut().zip(px).for_each(|(d, s)| *d = s);
            });
    }

    let mut shape = dim.slice().to_vec();
    shape.push(channels);
    Ok(buf.into_shape(shape)?.into_dimensionality::<D::Larger>()?)
}

/// 叠加层.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// 完整真值分割, 使用真值调色板.
    Truth,

    /// 完整计算分割, 使用计算调色板.
    Computed,

    /// 交集, 使用交集调色板.
    Intersection,

    /// 仅真值, 使用真值调色板.
    TruthOnly,

    /// 仅计算, 使用计算调色板.
    ComputedOnly,
}

impl Layer {
    /// 全部叠加层.
    pub const ALL: [Layer; 5] = [
        Layer::Truth,
        Layer::Computed,
        Layer::Intersection,
        Layer::TruthOnly,
        Layer::ComputedOnly,
    ];

    /// 取出单个标签在第 `z` 层切片上的该层掩码.
    fn mask_at(self, m: &DiffMasks<Ix3>, z: usize) -> Array2<bool> {
        let at = |a: &Array<bool, Ix3>| a.index_axis(Axis(0), z).to_owned();
        match self {
            Layer::Truth => &at(&m.truth_only) | &at(&m.intersection),
            Layer::Computed => &at(&m.computed_only) | &at(&m.intersection),
            Layer::Intersection => at(&m.intersection),
            Layer::TruthOnly => at(&m.truth_only),
            Layer::ComputedOnly => at(&m.computed_only),
        }
    }
}

/// 单个切片上的五层叠加图, 每层形状均为 (h, w, 通道).
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayFrame {
    /// 完整真值分割.
    pub truth: Array3<u8>,
    /// 完整计算分割.
    pub computed: Array3<u8>,
    /// 交集.
    pub intersection: Array3<u8>,
    /// 仅真值.
    pub truth_only: Array3<u8>,
    /// 仅计算.
    pub computed_only: Array3<u8>,
}

/// 一次比对的叠加图提供者.
///
/// 差异掩码与各层颜色在创建时一次性确定 (颜色不足在此时报错),
/// 之后每个切片的叠加图都是切片索引的纯函数.
#[derive(Clone, Debug)]
pub struct Overlays {
    diff: SegDiff,
    truth_colors: Vec<Rgb>,
    computed_colors: Vec<Rgb>,
    intersection_colors: Vec<Rgb>,
    with_alpha: bool,
}

impl Overlays {
    /// 为 `diff` 的标签集合解析三组调色板.
    ///
    /// 无透明通道时, 任一标签在任一层被着色为白色都返回 `Err(DiffError::ReservedColor)`.
    pub fn new(
        diff: SegDiff,
        palettes: &Palettes,
        policy: FallbackPolicy,
        with_alpha: bool,
    ) -> Result<Self, DiffError> {
        let labels = diff.labels();
        let truth_colors = palettes.truth.resolve(labels, policy)?;
        let computed_colors = palettes.computed.resolve(labels, policy)?;
        let intersection_colors = palettes.intersection.resolve(labels, policy)?;
        if !with_alpha {
            let colors = [&truth_colors, &computed_colors, &intersection_colors];
            for (label, rank) in labels.iter().zip(0..) {
                if colors.iter().any(|c| c[rank] == rgb::WHITE) {
                    return Err(DiffError::ReservedColor { label });
                }
            }
        }
        Ok(Self {
            diff,
            truth_colors,
            computed_colors,
            intersection_colors,
            with_alpha,
        })
    }

    /// 差异掩码.
    #[inline]
    pub fn diff(&self) -> &SegDiff {
        &self.diff
    }

    /// 切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.diff.len_z()
    }

    /// 叠加图是否带透明通道.
    #[inline]
    pub fn with_alpha(&self) -> bool {
        self.with_alpha
    }

    /// `layer` 使用的颜色, 按标签升序排列.
    pub fn colors(&self, layer: Layer) -> &[Rgb] {
        match layer {
            Layer::Truth | Layer::TruthOnly => &self.truth_colors,
            Layer::Computed | Layer::ComputedOnly => &self.computed_colors,
            Layer::Intersection => &self.intersection_colors,
        }
    }

    /// 第 `z` 层切片上 `layer` 层的叠加图, 形状为 (h, w, 通道).
    ///
    /// `z` 越界时返回 `Err(DiffError::SliceOutOfRange)`.
    pub fn layer_at(&self, z: usize, layer: Layer) -> Result<Array3<u8>, DiffError> {
        let len = self.len_z();
        if z >= len {
            return Err(DiffError::SliceOutOfRange { z, len });
        }
        let [_, h, w] = self.diff.shape();
        let masks: Vec<Array2<bool>> = self.diff.iter().map(|(_, m)| layer.mask_at(m, z)).collect();
        let views: Vec<_> = masks.iter().map(|m| m.view()).collect();
        encode_overlay(Ix2(h, w), &views, self.colors(layer), self.with_alpha)
    }

    /// 第 `z` 层切片上的全部五层叠加图.
    pub fn overlay_at(&self, z: usize) -> Result<OverlayFrame, DiffError> {
        Ok(OverlayFrame {
            truth: self.layer_at(z, Layer::Truth)?,
            computed: self.layer_at(z, Layer::Computed)?,
            intersection: self.layer_at(z, Layer::Intersection)?,
            truth_only: self.layer_at(z, Layer::TruthOnly)?,
            computed_only: self.layer_at(z, Layer::ComputedOnly)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::LabelSetPolicy;
    use ndarray::{array, s, Array3};

    const RED: Rgb = Rgb([255, 0, 0]);
    const GREEN: Rgb = Rgb([0, 255, 0]);
    const BLUE: Rgb = Rgb([0, 0, 255]);

    #[test]
    fn test_encode_fill() {
        let m = Array2::from_elem((2, 3), false);
        let rgba = encode_overlay(m.raw_dim(), &[m.view()], &[RED], true).unwrap();
        assert_eq!(rgba.dim(), (2, 3, 4));
        assert!(rgba.iter().all(|&v| v == 0));

        let rgb = encode_overlay(m.raw_dim(), &[m.view()], &[RED], false).unwrap();
        assert_eq!(rgb.dim(), (2, 3, 3));
        assert!(rgb.iter().all(|&v| v == 255));

        let empty = encode_overlay(Ix2(2, 3), &[], &[], true).unwrap();
        assert_eq!(empty, rgba);
    }

    #[test]
    fn test_encode_colors() {
        let a = array![[true, false], [false, false]];
        let b = array![[false, false], [false, true]];
        let img = encode_overlay(a.raw_dim(), &[a.view(), b.view()], &[RED, BLUE], true).unwrap();
        assert_eq!(img.slice(s![0, 0, ..]).to_vec(), vec![255, 0, 0, 255]);
        assert_eq!(img.slice(s![1, 1, ..]).to_vec(), vec![0, 0, 255, 255]);
        assert_eq!(img.slice(s![0, 1, ..]).to_vec(), vec![0, 0, 0, 0]);
    }

    /// 两个完全重叠的掩码: 结果为后者的颜色.
    #[test]
    fn test_encode_later_mask_wins() {
        let m = Array2::from_elem((3, 3), true);
        let img = encode_overlay(m.raw_dim(), &[m.view(), m.view()], &[RED, GREEN], true).unwrap();
        for px in img.lanes(Axis(2)) {
            assert_eq!(px.to_vec(), vec![0, 255, 0, 255]);
        }
    }

    #[test]
    fn test_encode_errors() {
        let m = Array2::from_elem((2, 2), true);
        let masks = [m.view(), m.view(), m.view(), m.view()];
        assert_eq!(
            encode_overlay(m.raw_dim(), &masks, &[RED, GREEN, BLUE], true).unwrap_err(),
            DiffError::ColorTableExhausted {
                labels: 4,
                colors: 3
            }
        );

        let wide = Array2::from_elem((2, 3), true);
        assert!(matches!(
            encode_overlay(m.raw_dim(), &[m.view(), wide.view()], &[RED, GREEN], true),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }

    /// 整体编码后取切片, 与逐切片编码结果一致.
    #[test]
    fn test_encode_volume_matches_slices() {
        let m = Array3::from_shape_fn((3, 2, 2), |(z, h, w)| (z + h + w) % 2 == 0);
        let whole = encode_overlay(m.raw_dim(), &[m.view()], &[BLUE], false).unwrap();
        assert_eq!(whole.dim(), (3, 2, 2, 3));
        for z in 0..3 {
            let slice = m.index_axis(Axis(0), z);
            let one = encode_overlay(slice.raw_dim(), &[slice], &[BLUE], false).unwrap();
            assert_eq!(whole.index_axis(Axis(0), z), one);
        }
    }

    fn overlays(policy: FallbackPolicy) -> Result<Overlays, DiffError> {
        let truth = array![[[1u8, 1], [0, 2]]];
        let computed = array![[[1u8, 0], [0, 2]]];
        let diff = SegDiff::compute(truth.view(), computed.view(), LabelSetPolicy::TruthOnly)?;
        let palettes = Palettes {
            truth: Palette::ranked([RED, GREEN]),
            computed: Palette::ranked([BLUE, GREEN]),
            intersection: Palette::ranked([GREEN]),
        };
        Overlays::new(diff, &palettes, policy, true)
    }

    #[test]
    fn test_overlays_layers() {
        let o = overlays(FallbackPolicy::Neutral).unwrap();
        assert_eq!(o.len_z(), 1);
        let f = o.overlay_at(0).unwrap();

        // 真值: 标签 1 在 (0,0),(0,1); 标签 2 在 (1,1).
        assert_eq!(f.truth.slice(s![0, 1, ..]).to_vec(), vec![255, 0, 0, 255]);
        assert_eq!(f.truth.slice(s![1, 1, ..]).to_vec(), vec![0, 255, 0, 255]);
        // 仅真值: 只有 (0,1).
        assert_eq!(f.truth_only.slice(s![0, 1, ..]).to_vec(), vec![255, 0, 0, 255]);
        assert_eq!(f.truth_only.slice(s![0, 0, ..]).to_vec(), vec![0, 0, 0, 0]);
        // 仅计算: 全背景.
        assert!(f.computed_only.iter().all(|&v| v == 0));
        // 交集调色板只有一种颜色, 标签 2 回退为中性灰.
        assert_eq!(f.intersection.slice(s![0, 0, ..]).to_vec(), vec![0, 255, 0, 255]);
        assert_eq!(f.intersection.slice(s![1, 1, ..]).to_vec(), vec![128, 128, 128, 255]);
        assert_eq!(f.computed.slice(s![1, 1, ..]).to_vec(), vec![0, 255, 0, 255]);
    }

    #[test]
    fn test_overlays_errors() {
        assert_eq!(
            overlays(FallbackPolicy::Strict).unwrap_err(),
            DiffError::ColorTableExhausted {
                labels: 2,
                colors: 1
            }
        );
        let o = overlays(FallbackPolicy::Neutral).unwrap();
        assert_eq!(
            o.overlay_at(1).unwrap_err(),
            DiffError::SliceOutOfRange { z: 1, len: 1 }
        );
    }

    #[test]
    fn test_overlays_white_without_alpha() {
        let truth = array![[[0u8, 1], [2, 2]]];
        let palettes = Palettes {
            computed: Palette::ranked([RED]).with_label(2, rgb::WHITE),
            ..Palettes::default()
        };
        let build = |with_alpha| {
            let diff = SegDiff::compute(truth.view(), truth.view(), LabelSetPolicy::TruthOnly).unwrap();
            Overlays::new(diff, &palettes, FallbackPolicy::Strict, with_alpha)
        };
        assert_eq!(build(false).unwrap_err(), DiffError::ReservedColor { label: 2 });
        assert!(build(true).is_ok());
    }

    #[test]
    fn test_overlays_empty_label_set() {
        let zeros = Array3::<u8>::zeros((2, 2, 2));
        let diff = SegDiff::compute(zeros.view(), zeros.view(), LabelSetPolicy::TruthOnly).unwrap();
        let o = Overlays::new(diff, &Palettes::default(), FallbackPolicy::Strict, true).unwrap();
        for layer in Layer::ALL {
            let img = o.layer_at(1, layer).unwrap();
            assert_eq!(img.dim(), (2, 2, 4));
            assert!(img.iter().all(|&v| v == 0));
        }
    }
}
