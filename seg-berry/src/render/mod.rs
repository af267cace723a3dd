//! 切片渲染.
//!
//! 将强度切片与叠加图合成为可供浏览或保存的 RGBA 图像.
//! 支持三种布局, 见 [`Layout`].

use std::fmt::{self, Display};
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use ndarray::ArrayView3;

use crate::consts::{rgb, DIFF_ALPHA, OVERLAY_ALPHA, RGBA_CHANNELS, RGB_CHANNELS};
use crate::diff::{check_shape, DiffError};
use crate::overlay::{Layer, OverlayFrame, Overlays, Rgb};
use crate::viewer::SliceSource;
use crate::{IntensityWindow, ScanSlice, Volume, VolumeAttr};

mod export;

pub use export::{frame_file_name, save_frames, RenderError};

#[cfg(feature = "rayon")]
pub use export::par_save_frames;

/// 面板之间分隔条的宽度 (像素).
pub const SEPARATOR: u32 = 2;

/// 按 `window` 将强度切片转换为不透明灰度图.
pub fn gray_image(slice: &ScanSlice, window: &IntensityWindow) -> RgbaImage {
    let (height, width) = slice.shape();
    RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let g = window.eval(slice[(y as usize, x as usize)]).unwrap_or(0);
        Rgba([g, g, g, u8::MAX])
    })
}

/// 以不透明度 `alpha` 将叠加图 `overlay` (h, w, 通道) 混合到 `base` 上.
///
/// 叠加图透明 (RGBA 模式下 alpha 为 0, RGB 模式下为白色) 的像素保持不变.
/// 形状不一致时返回 `Err(DiffError::ShapeMismatch)`.
pub fn blend(base: &mut RgbaImage, overlay: ArrayView3<u8>, alpha: f32) -> Result<(), DiffError> {
    let (h, w, c) = overlay.dim();
    let channels = if c == RGB_CHANNELS { RGB_CHANNELS } else { RGBA_CHANNELS };
    check_shape(
        &[base.height() as usize, base.width() as usize, channels],
        &[h, w, c],
    )?;

    for (y, row) in overlay.outer_iter().enumerate() {
        for (x, src) in row.outer_iter().enumerate() {
            let color = [src[0], src[1], src[2]];
            let coverage = match c {
                RGB_CHANNELS if Rgb(color) == rgb::WHITE => 0,
                RGB_CHANNELS => u8::MAX,
                _ => src[3],
            };
            if coverage == 0 {
                continue;
            }
            let a = alpha * f32::from(coverage) / 255.0;
            let dst = base.get_pixel_mut(x as u32, y as u32);
            for (d, s) in dst.0.iter_mut().zip(color) {
                *d = (f32::from(*d) * (1.0 - a) + f32::from(s) * a).round() as u8;
            }
        }
    }
    Ok(())
}

/// 在白色底图上完整绘制一张叠加图, 用于单独展示分割.
pub fn label_panel(overlay: ArrayView3<u8>) -> Result<RgbaImage, DiffError> {
    let (h, w, _) = overlay.dim();
    let mut panel = RgbaImage::from_pixel(w as u32, h as u32, Rgba(rgb::WHITE.opaque()));
    blend(&mut panel, overlay, 1.0)?;
    Ok(panel)
}

/// 将大小相同的 `panels` 按行优先排成 `cols` 列, 面板之间以分隔条隔开.
///
/// `panels` 为空时返回空图像.
pub fn compose(panels: &[RgbaImage], cols: usize) -> RgbaImage {
    let Some(first) = panels.first() else {
        return RgbaImage::new(0, 0);
    };
    let cols = cols.clamp(1, panels.len());
    let rows = (panels.len() + cols - 1) / cols;
    let (w, h) = first.dimensions();
    let span = |n: usize, size: u32| n as u32 * size + (n as u32 - 1) * SEPARATOR;

    let mut canvas = RgbaImage::from_pixel(
        span(cols, w),
        span(rows, h),
        Rgba(rgb::SLATE_GRAY.opaque()),
    );
    for (i, panel) in panels.iter().enumerate() {
        let x = (i % cols) as u32 * (w + SEPARATOR);
        let y = (i / cols) as u32 * (h + SEPARATOR);
        image::imageops::replace(&mut canvas, panel, i64::from(x), i64::from(y));
    }
    canvas
}

/// 帧布局.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `真值 | 差异 | 计算`, 一行三列.
    ///
    /// 差异面板为强度切片上依次叠加交集, 仅真值, 仅计算三层.
    #[default]
    Diff,

    /// `强度 | 真值` / `计算 | 差异`, 两行两列.
    Grid,

    /// `强度 | 真值 | 强度 + 真值`, 一行三列.
    Overlay,
}

impl Layout {
    /// 所有布局.
    pub const ALL: [Layout; 3] = [Layout::Diff, Layout::Grid, Layout::Overlay];

    /// 名称.
    pub const fn name(self) -> &'static str {
        match self {
            Layout::Diff => "diff",
            Layout::Grid => "grid",
            Layout::Overlay => "overlay",
        }
    }

    /// 每行的面板个数.
    pub const fn columns(self) -> usize {
        match self {
            Layout::Grid => 2,
            Layout::Diff | Layout::Overlay => 3,
        }
    }
}

impl Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layout::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown layout `{s}`, expected one of diff, grid, overlay"))
    }
}

/// 渲染参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderOptions {
    /// 帧布局.
    pub layout: Layout,

    /// 强度窗口.
    pub window: IntensityWindow,

    /// 差异面板中三层叠加的不透明度.
    pub diff_alpha: f32,

    /// 叠加视图中分割层的不透明度.
    pub overlay_alpha: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            window: IntensityWindow::default(),
            diff_alpha: DIFF_ALPHA,
            overlay_alpha: OVERLAY_ALPHA,
        }
    }
}

/// 帧渲染器: 强度体, 叠加图与渲染参数的组合.
#[derive(Clone, Debug)]
pub struct FrameRenderer<'a> {
    volume: &'a Volume,
    overlays: &'a Overlays,
    options: RenderOptions,
}

impl<'a> FrameRenderer<'a> {
    /// 创建渲染器. 强度体与叠加图形状不一致时返回 `Err(DiffError::ShapeMismatch)`.
    pub fn new(
        volume: &'a Volume,
        overlays: &'a Overlays,
        options: RenderOptions,
    ) -> Result<Self, DiffError> {
        let (z, h, w) = volume.shape();
        check_shape(&overlays.diff().shape(), &[z, h, w])?;
        Ok(Self {
            volume,
            overlays,
            options,
        })
    }

    /// 渲染参数.
    #[inline]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    fn diff_panel(&self, mut gray: RgbaImage, f: &OverlayFrame) -> Result<RgbaImage, DiffError> {
        let alpha = self.options.diff_alpha;
        blend(&mut gray, f.intersection.view(), alpha)?;
        blend(&mut gray, f.truth_only.view(), alpha)?;
        blend(&mut gray, f.computed_only.view(), alpha)?;
        Ok(gray)
    }
}

impl SliceSource for FrameRenderer<'_> {
    type Frame = RgbaImage;

    #[inline]
    fn len(&self) -> usize {
        self.volume.len_z()
    }

    fn render(&self, z: usize) -> Result<RgbaImage, DiffError> {
        let len = self.len();
        if z >= len {
            return Err(DiffError::SliceOutOfRange { z, len });
        }
        let gray = gray_image(&self.volume.slice_at(z), &self.options.window);

        let panels = match self.options.layout {
            Layout::Diff => {
                let f = self.overlays.overlay_at(z)?;
                vec![
                    label_panel(f.truth.view())?,
                    self.diff_panel(gray, &f)?,
                    label_panel(f.computed.view())?,
                ]
            }
            Layout::Grid => {
                let f = self.overlays.overlay_at(z)?;
                vec![
                    gray.clone(),
                    label_panel(f.truth.view())?,
                    label_panel(f.computed.view())?,
                    self.diff_panel(gray, &f)?,
                ]
            }
            Layout::Overlay => {
                let truth = self.overlays.layer_at(z, Layer::Truth)?;
                let mut mixed = gray.clone();
                blend(&mut mixed, truth.view(), self.options.overlay_alpha)?;
                vec![gray, label_panel(truth.view())?, mixed]
            }
        };
        Ok(compose(&panels, self.options.layout.columns()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{LabelSetPolicy, SegDiff};
    use crate::overlay::{FallbackPolicy, Palette, Palettes};
    use ndarray::{array, Array3};

    const RED: Rgb = Rgb([255, 0, 0]);
    const BLUE: Rgb = Rgb([0, 0, 255]);

    fn fixture() -> (Volume, Overlays) {
        let volume = Volume::new(
            array![[[0.0, 255.0], [128.0, 64.0]], [[10.0, 20.0], [30.0, 40.0]]],
            [1.0; 3],
            [0.0; 3],
        )
        .unwrap();
        let truth = array![[[1u8, 1], [0, 0]], [[0, 0], [0, 0]]];
        let computed = array![[[1u8, 0], [0, 1]], [[0, 0], [0, 0]]];
        let diff = SegDiff::compute(truth.view(), computed.view(), LabelSetPolicy::TruthOnly).unwrap();
        let palettes = Palettes {
            truth: Palette::ranked([BLUE]),
            computed: Palette::ranked([RED]),
            intersection: Palette::ranked([Rgb([0, 255, 0])]),
        };
        let overlays = Overlays::new(diff, &palettes, FallbackPolicy::Strict, true).unwrap();
        (volume, overlays)
    }

    #[test]
    fn test_gray_image() {
        let (volume, _) = fixture();
        let img = gray_image(&volume.slice_at(0), &IntensityWindow::from_byte_range());
        assert_eq!(img.dimensions(), (2, 2));
        // 图像 (x, y) 对应切片 (h = y, w = x).
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([254, 254, 254, 255]));
        assert_eq!(img.get_pixel(0, 1), &Rgba([127, 127, 127, 255]));
    }

    /// 透明像素保持不变, 覆盖像素按不透明度混合.
    #[test]
    fn test_blend() {
        let mut base = RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255]));
        let overlay = Array3::from_shape_vec((1, 2, 4), vec![0, 0, 0, 0, 200, 0, 0, 255]).unwrap();
        blend(&mut base, overlay.view(), 0.5).unwrap();
        assert_eq!(base.get_pixel(0, 0), &Rgba([100, 100, 100, 255]));
        assert_eq!(base.get_pixel(1, 0), &Rgba([150, 50, 50, 255]));

        // RGB 模式下白色视为透明.
        let mut base = RgbaImage::from_pixel(2, 1, Rgba([10, 10, 10, 255]));
        let overlay = Array3::from_shape_vec((1, 2, 3), vec![255, 255, 255, 0, 0, 255]).unwrap();
        blend(&mut base, overlay.view(), 1.0).unwrap();
        assert_eq!(base.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        assert_eq!(base.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));

        let wrong = Array3::<u8>::zeros((2, 2, 4));
        assert!(matches!(
            blend(&mut base, wrong.view(), 1.0),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_compose() {
        let a = RgbaImage::from_pixel(3, 2, Rgba([1, 1, 1, 255]));
        let panels = vec![a.clone(), a.clone(), a.clone(), a];
        let grid = compose(&panels, 2);
        assert_eq!(grid.dimensions(), (3 * 2 + SEPARATOR, 2 * 2 + SEPARATOR));
        assert_eq!(grid.get_pixel(3, 0), &Rgba(rgb::SLATE_GRAY.opaque()));
        assert_eq!(grid.get_pixel(3 + SEPARATOR, 2 + SEPARATOR), &Rgba([1, 1, 1, 255]));

        let row = compose(&panels[..3], 3);
        assert_eq!(row.dimensions(), (3 * 3 + 2 * SEPARATOR, 2));
        assert_eq!(compose(&[], 3).dimensions(), (0, 0));
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("grid".parse::<Layout>(), Ok(Layout::Grid));
        assert_eq!("Overlay".parse::<Layout>(), Ok(Layout::Overlay));
        assert!("mosaic".parse::<Layout>().is_err());
        assert_eq!(Layout::Diff.to_string(), "diff");
    }

    #[test]
    fn test_frame_renderer_layouts() {
        let (volume, overlays) = fixture();
        for layout in Layout::ALL {
            let options = RenderOptions {
                layout,
                window: IntensityWindow::from_byte_range(),
                ..Default::default()
            };
            let r = FrameRenderer::new(&volume, &overlays, options).unwrap();
            assert_eq!(r.len(), 2);
            let img = r.render(0).unwrap();
            let expected = match layout {
                Layout::Grid => (2 * 2 + SEPARATOR, 2 * 2 + SEPARATOR),
                _ => (2 * 3 + 2 * SEPARATOR, 2),
            };
            assert_eq!(img.dimensions(), expected);
            assert_eq!(
                r.render(2).unwrap_err(),
                DiffError::SliceOutOfRange { z: 2, len: 2 }
            );
        }
    }

    #[test]
    fn test_diff_layout_pixels() {
        let (volume, overlays) = fixture();
        let options = RenderOptions {
            window: IntensityWindow::from_byte_range(),
            diff_alpha: 1.0,
            ..Default::default()
        };
        let r = FrameRenderer::new(&volume, &overlays, options).unwrap();
        let img = r.render(0).unwrap();

        // 真值面板: (0,0),(1,0) 为蓝色, 其余为白色.
        assert_eq!(img.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(0, 1), &Rgba([255, 255, 255, 255]));
        // 差异面板: 交集 (0,0) 绿色, 仅真值 (1,0) 蓝色, 仅计算 (1,1) 红色.
        let dx = 2 + SEPARATOR;
        assert_eq!(img.get_pixel(dx, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(img.get_pixel(dx + 1, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(dx + 1, 1), &Rgba([255, 0, 0, 255]));
        // 未覆盖处为强度灰度.
        assert_eq!(img.get_pixel(dx, 1), &Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_renderer_shape_guard() {
        let (_, overlays) = fixture();
        let other = Volume::new(Array3::zeros((2, 2, 3)), [1.0; 3], [0.0; 3]).unwrap();
        assert!(matches!(
            FrameRenderer::new(&other, &overlays, RenderOptions::default()),
            Err(DiffError::ShapeMismatch { .. })
        ));
    }
}
