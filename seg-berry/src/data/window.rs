/// 强度窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    level: f32,
    width: f32,
}

impl IntensityWindow {
    /// 构建强度窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<IntensityWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个便于展示腹部 CT 扫描的窗口. 该窗口的窗位为 100, 窗宽为 750.
    #[inline]
    pub const fn from_ct_visual() -> IntensityWindow {
        Self {
            level: 100.0,
            width: 750.0,
        }
    }

    /// 构建一个直接覆盖 8-bit 灰度范围的窗口. 该窗口的窗位为 128, 窗宽为 255.
    #[inline]
    pub const fn from_byte_range() -> IntensityWindow {
        Self {
            level: 128.0,
            width: 255.0,
        }
    }

    /// 构建恰好覆盖 `[lo, hi]` 的窗口.
    ///
    /// 若 `lo >= hi` (例如常数体数据) 或二者超出合理范围, 返回 `None`.
    pub fn from_range(lo: f32, hi: f32) -> Option<IntensityWindow> {
        if !(lo < hi) {
            return None;
        }
        Self::new((lo + hi) / 2.0, hi - lo)
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前窗设置下, 强度 `v` 对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if v <= lb {
            Some(u8::MIN)
        } else if v >= self.upper_bound() {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((v - lb) / self.width()) * 255.0) as u8)
        }
    }
}

impl Default for IntensityWindow {
    #[inline]
    fn default() -> Self {
        Self::from_ct_visual()
    }
}
