use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis};

use crate::diff::{DiffError, LabelSet, LabelSetPolicy, SegDiff};
use crate::io::{self, LoadError};
use crate::{Idx2d, Idx3d};

pub mod slice;
pub mod window;

pub use slice::{ImgWriteRaw, ImgWriteVis, LabelSlice, ScanSlice};

pub use window::IntensityWindow;

/// 体数据的几何信息: 形状、体素分辨率与原点.
///
/// 三者均按照 (z, h, w) 顺序存储, 与数据数组的轴顺序一致.
/// 而 MetaImage/NIfTI 文件本身按照 (w, h, z) 记录, 由加载器负责转换.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Geometry {
    shape: Idx3d,
    spacing: [f64; 3],
    origin: [f64; 3],
}

impl Geometry {
    /// 直接构建几何信息.
    #[inline]
    pub const fn new(shape: Idx3d, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            shape,
            spacing,
            origin,
        }
    }

    /// 数据形状 (z, h, w).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素分辨率 (z, h, w), 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 原点 (z, h, w), 以毫米为单位.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }
}

/// 3D 体数据的共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &Geometry;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape()
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.geometry().spacing()
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.pix_dim()[0]
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.pix_dim()[1]
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.pix_dim()[2]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// 3D 强度体 (CT/MR 扫描), 值以 `f32` 保存, 按 (z, h, w) 组织.
///
/// 创建后不可变. 所有体素值保证是有限数.
#[derive(Debug, Clone)]
pub struct Volume {
    geometry: Geometry,
    data: Array3<f32>,
}

impl VolumeAttr for Volume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 由 (z, h, w) 组织的数据和分辨率/原点创建强度体.
    ///
    /// 若存在 NaN 或无穷值, 返回 `Err(LoadError::NonFiniteIntensity)`,
    /// 其中携带第一个非法体素的位置.
    pub fn new(data: Array3<f32>, spacing: [f64; 3], origin: [f64; 3]) -> Result<Self, LoadError> {
        if let Some((pos, value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(LoadError::NonFiniteIntensity { pos, value: *value });
        }
        let geometry = Geometry::new(data.dim(), spacing, origin);
        Ok(Self { geometry, data })
    }

    /// 打开强度体文件. 格式由扩展名决定, 见 [`crate::io::open_volume`].
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        io::open_volume(path)
    }

    /// 获取 3D 扫描 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ScanSlice> {
        self.data.axis_iter(Axis(0)).map(ScanSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获取强度最小值和最大值. 空体数据返回 `None`.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        use itertools::{Itertools, MinMaxResult};
        use ordered_float::NotNan;

        // `Self::new` 已保证不存在 NaN.
        match self.data.iter().filter_map(|v| NotNan::new(*v).ok()).minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(v) => Some((*v, *v)),
            MinMaxResult::MinMax(lo, hi) => Some((*lo, *hi)),
        }
    }
}

/// 3D 标签体 (分割结果), 值以 `u8` 保存, 按 (z, h, w) 组织.
/// `0` 代表背景, 其余每个值代表一个独立的解剖结构类别.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    geometry: Geometry,
    data: Array3<u8>,
}

impl VolumeAttr for LabelVolume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 由 (z, h, w) 组织的标签数据和分辨率/原点创建标签体.
    #[inline]
    pub fn new(data: Array3<u8>, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        let geometry = Geometry::new(data.dim(), spacing, origin);
        Self { geometry, data }
    }

    /// 以单位分辨率直接包装标签数据. 主要用于实验和测试.
    #[inline]
    pub fn from_labels(data: Array3<u8>) -> Self {
        Self::new(data, [1.0; 3], [0.0; 3])
    }

    /// 打开标签体文件. 格式由扩展名决定, 见 [`crate::io::open_labels`].
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        io::open_labels(path)
    }

    /// 获取 3D 标注 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> LabelSlice<'_> {
        LabelSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 标注水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = LabelSlice> {
        self.data.axis_iter(Axis(0)).map(LabelSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取标签集合 (升序、去重、去背景).
    #[inline]
    pub fn label_set(&self) -> LabelSet {
        crate::diff::label_set(self.data.view())
    }
}

/// 一次比对所需的全部数据: 强度体、真值标签体和计算标签体.
///
/// 该结构完全透明. 三者形状一致由 [`Study::new`] 和 [`Study::open`] 保证.
#[derive(Debug, Clone)]
pub struct Study {
    /// 强度体.
    pub volume: Volume,

    /// 真值分割.
    pub truth: LabelVolume,

    /// 计算 (预测) 分割.
    pub computed: LabelVolume,
}

impl Study {
    /// 组合三份数据. 任意两者形状不一致时返回
    /// `Err(DiffError::ShapeMismatch)`, 其中 `expected` 为真值形状.
    pub fn new(volume: Volume, truth: LabelVolume, computed: LabelVolume) -> Result<Self, DiffError> {
        check_same_shape(&truth, &computed)?;
        check_same_shape(&truth, &volume)?;
        Ok(Self {
            volume,
            truth,
            computed,
        })
    }

    /// 分别打开强度体、真值分割和计算分割. 任一文件打开失败或形状不一致时返回 `Err`.
    pub fn open(
        volume_path: impl AsRef<Path>,
        truth_path: impl AsRef<Path>,
        computed_path: impl AsRef<Path>,
    ) -> Result<Self, LoadError> {
        let volume = Volume::open(volume_path.as_ref())?;
        let SegPair { truth, computed } = SegPair::open(truth_path, computed_path)?;
        log::info!(
            "Loaded study: shape {:?}, spacing {:?} mm",
            volume.shape(),
            volume.pix_dim()
        );
        Ok(Self::new(volume, truth, computed)?)
    }

    /// 计算真值分割与计算分割的逐标签差异.
    #[inline]
    pub fn diff(&self, policy: LabelSetPolicy) -> Result<SegDiff, DiffError> {
        SegDiff::compute(self.truth.data(), self.computed.data(), policy)
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.volume.len_z()
    }
}

/// 一对形状一致的分割: 真值与计算结果.
#[derive(Debug, Clone)]
pub struct SegPair {
    /// 真值分割.
    pub truth: LabelVolume,

    /// 计算 (预测) 分割.
    pub computed: LabelVolume,
}

impl SegPair {
    /// 组合两份分割. 形状不一致时返回 `Err(DiffError::ShapeMismatch)`.
    pub fn new(truth: LabelVolume, computed: LabelVolume) -> Result<Self, DiffError> {
        check_same_shape(&truth, &computed)?;
        Ok(Self { truth, computed })
    }

    /// 分别打开真值分割和计算分割.
    pub fn open(
        truth_path: impl AsRef<Path>,
        computed_path: impl AsRef<Path>,
    ) -> Result<Self, LoadError> {
        let truth = LabelVolume::open(truth_path)?;
        let computed = LabelVolume::open(computed_path)?;
        Ok(Self::new(truth, computed)?)
    }

    /// 计算逐标签差异.
    #[inline]
    pub fn diff(&self, policy: LabelSetPolicy) -> Result<SegDiff, DiffError> {
        SegDiff::compute(self.truth.data(), self.computed.data(), policy)
    }
}

/// 检查两份体数据形状一致.
fn check_same_shape(a: &impl VolumeAttr, b: &impl VolumeAttr) -> Result<(), DiffError> {
    let (sa, sb) = (a.shape(), b.shape());
    if sa == sb {
        Ok(())
    } else {
        Err(DiffError::ShapeMismatch {
            expected: vec![sa.0, sa.1, sa.2],
            found: vec![sb.0, sb.1, sb.2],
        })
    }
}
