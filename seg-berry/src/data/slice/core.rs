use crate::consts::gray::*;
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{ArrayView2, Ix2};
use std::ops::Index;

/// 不可变、借用的二维水平标签切片.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::LabelVolume`].
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for LabelSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> LabelSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, u8>) -> Self {
        Self { data }
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, u8, Ix2> {
        self.data.iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&u8> {
        self.data.get(pos)
    }

    /// 该图是否为全背景图?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    /// 统计图像中值为 `label` 的像素总个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|&p| *p == label).count()
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
        self.data.indexed_iter()
    }
}

/// 不可变、借用的二维水平扫描切片.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::Volume`].
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> ScanSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'a, f32> {
        self.data.clone()
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f32, Ix2> {
        self.data.iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 强度值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
        self.data.indexed_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{LabelSlice, ScanSlice};
    use ndarray::array;

    #[test]
    fn test_label_slice_queries() {
        let data = array![[0u8, 1, 1], [0, 2, 0]];
        let s = LabelSlice::new(data.view());
        assert_eq!(s.shape(), (2, 3));
        assert_eq!(s.size(), 6);
        assert_eq!(s.count(1), 2);
        assert_eq!(s[(1, 1)], 2);
        assert_eq!(s.get((2, 0)), None);
        assert!(!s.is_background());

        let empty = ndarray::Array2::<u8>::zeros((3, 3));
        assert!(LabelSlice::new(empty.view()).is_background());
    }

    #[test]
    fn test_scan_slice_indexed_iter() {
        let data = array![[0.0f32, -1.0], [2.5, 4.0]];
        let s = ScanSlice::new(data.view());
        let collected: Vec<_> = s.indexed_iter().map(|(p, v)| (p, *v)).collect();
        assert_eq!(
            collected,
            vec![((0, 0), 0.0), ((0, 1), -1.0), ((1, 0), 2.5), ((1, 1), 4.0)]
        );
    }
}
