//! 图像的持久化存储.

use crate::{IntensityWindow, LabelSlice, ScanSlice};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 `LabelSlice` 这类仅存在少量离散标签值的图像, 在保存时会映射到肉眼较易区分的灰度;
/// 对于 `ScanSlice` 这类以原始强度存储的扫描, 在保存时会用默认窗口规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    match label {
        // 背景为黑色
        BACKGROUND => BLACK,

        // 第一个前景类别为白色
        1 => WHITE,

        2 => LIGHT_GRAY,

        3 => GRAY,

        // 其余类别不再细分
        _ => DARK_GRAY,
    }
}

/// 背景/标签 1/2/3 分别映射为黑色/白色/亮灰色/灰色, 其余标签均为暗灰色.
impl ImgWriteVis for LabelSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
        }
        buf.save(path)
    }
}

/// 按原样存储.
impl ImgWriteRaw for LabelSlice<'_> {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
        }
        buf.save(path)
    }
}

/// 窗位 100, 窗宽 750.
impl ImgWriteVis for ScanSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        const WINDOW: IntensityWindow = IntensityWindow::from_ct_visual();
        crate::render::gray_image(self, &WINDOW).save(path)
    }
}
