//! 通用常量.

use crate::overlay::Rgb;

/// 单通道颜色.
pub mod gray {
    /// 标签体数据中, 背景的体素值.
    pub const BACKGROUND: u8 = 0;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道亮灰色.
    pub const LIGHT_GRAY: u8 = 0b_1100_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 像素是否是前景 (任意非零标签)?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_background(p)
    }
}

/// 三通道颜色.
pub mod rgb {
    use super::Rgb;

    /// 白色. 无透明通道时的默认填充色.
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    /// 中性灰. 调色板耗尽且允许回退时使用.
    pub const NEUTRAL: Rgb = Rgb([128, 128, 128]);

    /// 面板之间的分隔色.
    pub const SLATE_GRAY: Rgb = Rgb([112, 128, 144]);

    /// 真值分割的默认按序调色板 (蓝色系).
    pub const BLUES: [Rgb; 3] = [Rgb([31, 119, 180]), Rgb([23, 190, 207]), Rgb([8, 48, 107])];

    /// 计算分割的默认按序调色板 (红色系).
    pub const REDS: [Rgb; 3] = [Rgb([214, 39, 40]), Rgb([255, 127, 14]), Rgb([227, 119, 194])];

    /// 交集的默认按序调色板 (紫色系).
    pub const PURPLES: [Rgb; 3] = [Rgb([117, 107, 177]), Rgb([158, 154, 200]), Rgb([84, 39, 143])];
}

/// RGBA 叠加图的通道数.
pub const RGBA_CHANNELS: usize = 4;

/// RGB 叠加图的通道数.
pub const RGB_CHANNELS: usize = 3;

/// 差异视图中, 交集/仅真值/仅计算三层叠加的默认不透明度.
pub const DIFF_ALPHA: f32 = 0.2;

/// 单一分割叠加视图中分割层的默认不透明度.
pub const OVERLAY_ALPHA: f32 = 0.5;
