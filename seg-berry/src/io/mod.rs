//! 体数据加载与写出.
//!
//! 文件格式由扩展名决定:
//!
//! - `.mhd`, `.mha`: MetaImage, 见 [`metaimage`];
//! - `.nii`, `.nii.gz`: NIfTI-1.

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use num::ToPrimitive;
use thiserror::Error;

use crate::data::Geometry;
use crate::diff::DiffError;
use crate::{Idx3d, LabelVolume, Volume, VolumeAttr};

pub mod metaimage;

pub use metaimage::MetaImageError;

/// 体数据加载错误.
#[derive(Debug, Error)]
pub enum LoadError {
    /// MetaImage 文件读取或解析失败.
    #[error("cannot load {path}: {source}")]
    MetaImage {
        /// 出错的文件.
        path: PathBuf,
        /// 底层错误.
        source: MetaImageError,
    },

    /// NIfTI 文件读取失败.
    #[error("cannot load NIfTI file: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// NIfTI 数据不是 3D 的.
    #[error("expected a 3D volume, found {0} dimensions")]
    Dimension(usize),

    /// 无法从扩展名判断文件格式.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    /// 标签值为负数, 非整数或大于 255.
    #[error("invalid label value {value} at {pos:?}")]
    InvalidLabel {
        /// 第一个非法体素的位置 (z, h, w).
        pos: Idx3d,
        /// 原始值.
        value: f64,
    },

    /// 强度值为 NaN 或无穷.
    #[error("non-finite intensity {value} at {pos:?}")]
    NonFiniteIntensity {
        /// 第一个非法体素的位置 (z, h, w).
        pos: Idx3d,
        /// 原始值.
        value: f32,
    },

    /// 几份数据之间不一致.
    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// 支持的文件格式.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// `.mhd` 或 `.mha`.
    MetaImage,
    /// `.nii` 或 `.nii.gz`.
    Nifti,
}

impl Format {
    /// 根据扩展名判断 `path` 的格式. 无法判断时返回 `None`.
    pub fn of(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".mhd") || name.ends_with(".mha") {
            Some(Format::MetaImage)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Format::Nifti)
        } else {
            None
        }
    }
}

/// 由展平下标求 (z, h, w) 位置.
#[inline]
fn unravel((_, h, w): Idx3d, i: usize) -> Idx3d {
    (i / (h * w), (i / w) % h, i % w)
}

/// 将任意数值转换为标签. 负数, 非整数或大于 255 的值视为非法.
fn to_label(shape: Idx3d, i: usize, v: &dyn ToPrimitive) -> Result<u8, LoadError> {
    let value = v.to_f64().unwrap_or(f64::NAN);
    if value.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(LoadError::InvalidLabel {
            pos: unravel(shape, i),
            value,
        })
    }
}

/// 将任意数值转换为强度. 超出 `f32` 范围的值变为非有限值, 由 [`Volume::new`] 拒绝.
#[inline]
fn to_intensity(v: &dyn ToPrimitive) -> f32 {
    v.to_f64().map_or(f32::NAN, |f| f as f32)
}

/// 读取 MetaImage 文件, 用 `convert` 逐个转换体素值.
fn read_metaimage<T>(
    path: &Path,
    convert: impl FnMut(Idx3d, usize, &dyn ToPrimitive) -> Result<T, LoadError>,
) -> Result<(Array3<T>, Geometry), LoadError> {
    let wrap = |source| LoadError::MetaImage {
        path: path.to_path_buf(),
        source,
    };
    let mut convert = convert;

    let (header, raw) = metaimage::read_raw(path).map_err(wrap)?;
    let shape = header.shape();
    let values = metaimage::decode_elements(&raw, header.element_type, header.msb, |i, v| {
        convert(shape, i, v)
    })?;
    let data = metaimage::into_array(&header, values).map_err(wrap)?;
    Ok((data, header.geometry()))
}

/// 读取 NIfTI 文件, 返回 (z, h, w) 组织的数据和几何信息.
fn read_nifti(path: &Path) -> Result<(ArrayD<f64>, Geometry), LoadError> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();

    // [W, H, z] -> [z, H, W].
    let data = obj.into_volume().into_ndarray::<f64>()?;
    if data.ndim() != 3 {
        return Err(LoadError::Dimension(data.ndim()));
    }
    let data = data.permuted_axes([2, 1, 0].as_slice());
    let data = data.as_standard_layout().into_owned();

    let shape = (data.shape()[0], data.shape()[1], data.shape()[2]);
    let [_, w, h, z, ..] = header.pixdim.map(f64::from);
    let origin = [header.quatern_z, header.quatern_y, header.quatern_x].map(f64::from);
    Ok((data, Geometry::new(shape, [z, h, w], origin)))
}

/// 打开强度体. 体素值可以是任意受支持的数值类型, 一律转换为 `f32`.
///
/// 任一体素为 NaN 或无穷时返回 `Err(LoadError::NonFiniteIntensity)`.
pub fn open_volume<P: AsRef<Path>>(path: P) -> Result<Volume, LoadError> {
    let path = path.as_ref();
    let (data, geometry) = match Format::of(path) {
        Some(Format::MetaImage) => read_metaimage(path, |_, _, v| Ok(to_intensity(v)))?,
        Some(Format::Nifti) => {
            let (data, geometry) = read_nifti(path)?;
            let data = data.mapv(|v| v as f32).into_dimensionality::<Ix3>();
            (data.map_err(DiffError::from)?, geometry)
        }
        None => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    };
    log::debug!("Opened volume {} with shape {:?}", path.display(), data.dim());
    Volume::new(data, geometry.spacing(), geometry.origin())
}

/// 打开标签体. 体素值必须是 `0..=255` 内的整数.
///
/// 否则返回 `Err(LoadError::InvalidLabel)`, 其中携带第一个非法体素的位置.
pub fn open_labels<P: AsRef<Path>>(path: P) -> Result<LabelVolume, LoadError> {
    let path = path.as_ref();
    let (data, geometry) = match Format::of(path) {
        Some(Format::MetaImage) => read_metaimage(path, to_label)?,
        Some(Format::Nifti) => {
            let (data, geometry) = read_nifti(path)?;
            let shape = geometry.shape();
            let values = data
                .iter()
                .enumerate()
                .map(|(i, v)| to_label(shape, i, v))
                .collect::<Result<Vec<u8>, _>>()?;
            (Array3::from_shape_vec(shape, values).map_err(DiffError::from)?, geometry)
        }
        None => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    };
    log::debug!("Opened labels {} with shape {:?}", path.display(), data.dim());
    Ok(LabelVolume::new(data, geometry.spacing(), geometry.origin()))
}

/// 以 `MET_UCHAR` 写出标签体. 写出格式见 [`metaimage::write`].
pub fn write_labels<P: AsRef<Path>>(
    path: P,
    labels: &LabelVolume,
    compressed: bool,
) -> Result<(), MetaImageError> {
    metaimage::write(path.as_ref(), labels.data(), labels.geometry(), compressed)
}

/// 以 `MET_FLOAT` 写出强度体. 写出格式见 [`metaimage::write`].
pub fn write_volume<P: AsRef<Path>>(
    path: P,
    volume: &Volume,
    compressed: bool,
) -> Result<(), MetaImageError> {
    metaimage::write(path.as_ref(), volume.data(), volume.geometry(), compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;

    fn write_header(dir: &Path, name: &str, element_type: &str) -> PathBuf {
        let mhd = dir.join(format!("{name}.mhd"));
        fs::write(
            &mhd,
            format!(
                "NDims = 3\nDimSize = 2 1 1\nElementSpacing = 1 1 3\n\
                 ElementType = {element_type}\nElementDataFile = {name}.raw\n"
            ),
        )
        .unwrap();
        mhd
    }

    #[test]
    fn test_format_of() {
        assert_eq!(Format::of(Path::new("a/b.MHD")), Some(Format::MetaImage));
        assert_eq!(Format::of(Path::new("b.mha")), Some(Format::MetaImage));
        assert_eq!(Format::of(Path::new("b.nii.gz")), Some(Format::Nifti));
        assert_eq!(Format::of(Path::new("b.raw")), None);
        assert!(matches!(
            open_labels("scan.png"),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unravel() {
        let shape = (2, 3, 4);
        assert_eq!(unravel(shape, 0), (0, 0, 0));
        assert_eq!(unravel(shape, 5), (0, 1, 1));
        assert_eq!(unravel(shape, 23), (1, 2, 3));
    }

    #[test]
    fn test_labels_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let labels = LabelVolume::new(array![[[0, 1, 2], [255, 7, 0]]], [2.0, 0.5, 0.5], [0.0; 3]);
        for (name, compressed) in [("l.mhd", false), ("l.mha", true)] {
            let path = dir.path().join(name);
            write_labels(&path, &labels, compressed).unwrap();
            let back = open_labels(&path).unwrap();
            assert_eq!(back.data(), labels.data());
            assert_eq!(back.pix_dim(), [2.0, 0.5, 0.5]);
        }
    }

    #[test]
    fn test_volume_round_trip_and_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::new(array![[[-1000.0, 0.25], [3.5, 1e4]]], [1.0; 3], [0.0; 3]).unwrap();
        let path = dir.path().join("v.mhd");
        write_volume(&path, &volume, false).unwrap();
        assert_eq!(open_volume(&path).unwrap().data(), volume.data());

        // MET_SHORT 强度体.
        let mhd = write_header(dir.path(), "s", "MET_SHORT");
        let raw: Vec<u8> = [-1024i16, 40].iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.path().join("s.raw"), raw).unwrap();
        let v = open_volume(&mhd).unwrap();
        assert_eq!(v.data(), array![[[-1024.0f32, 40.0]]]);
        assert_eq!(v.z_mm(), 3.0);
    }

    #[test]
    fn test_invalid_labels() {
        let dir = tempfile::tempdir().unwrap();

        let mhd = write_header(dir.path(), "neg", "MET_SHORT");
        let raw: Vec<u8> = [1i16, -2].iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.path().join("neg.raw"), raw).unwrap();
        match open_labels(&mhd) {
            Err(LoadError::InvalidLabel { pos, value }) => {
                assert_eq!(pos, (0, 0, 1));
                assert_eq!(value, -2.0);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mhd = write_header(dir.path(), "frac", "MET_FLOAT");
        let raw: Vec<u8> = [1.5f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.path().join("frac.raw"), raw).unwrap();
        assert!(matches!(
            open_labels(&mhd),
            Err(LoadError::InvalidLabel { pos: (0, 0, 0), .. })
        ));

        let mhd = write_header(dir.path(), "big", "MET_USHORT");
        let raw: Vec<u8> = [256u16, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.path().join("big.raw"), raw).unwrap();
        assert!(matches!(
            open_labels(&mhd),
            Err(LoadError::InvalidLabel { .. })
        ));

        // 整数值的浮点标签是合法的.
        let mhd = write_header(dir.path(), "ok", "MET_DOUBLE");
        let raw: Vec<u8> = [3.0f64, 0.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.path().join("ok.raw"), raw).unwrap();
        assert_eq!(open_labels(&mhd).unwrap().data(), array![[[3u8, 0]]]);
    }

    #[test]
    fn test_non_finite_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let mhd = write_header(dir.path(), "nan", "MET_FLOAT");
        let raw: Vec<u8> = [0.0f32, f32::INFINITY]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        fs::write(dir.path().join("nan.raw"), raw).unwrap();
        assert!(matches!(
            open_volume(&mhd),
            Err(LoadError::NonFiniteIntensity { pos: (0, 0, 1), .. })
        ));
    }

    #[test]
    fn test_nifti_axes_and_spacing() {
        use nifti::writer::WriterOptions;
        use nifti::NiftiHeader;

        let dir = tempfile::tempdir().unwrap();
        let header = NiftiHeader {
            pixdim: [1.0, 0.5, 0.75, 2.5, 1.0, 1.0, 1.0, 1.0],
            quatern_x: 1.0,
            quatern_y: 2.0,
            quatern_z: 3.0,
            ..NiftiHeader::default()
        };
        // 文件中按 [W, H, z] 存储.
        let xyz = Array3::from_shape_fn((3, 2, 4), |(x, y, z)| (x + 3 * y + 6 * z) as u8);

        for name in ["l.nii", "l.nii.gz"] {
            let path = dir.path().join(name);
            WriterOptions::new(&path)
                .reference_header(&header)
                .write_nifti(&xyz)
                .unwrap();

            let labels = open_labels(&path).unwrap();
            assert_eq!(labels.data().dim(), (4, 2, 3));
            for ((z, h, w), &v) in labels.data().indexed_iter() {
                assert_eq!(v, xyz[(w, h, z)]);
            }
            assert_eq!(labels.geometry().spacing(), [2.5, 0.75, 0.5]);
            assert_eq!(labels.geometry().origin(), [3.0, 2.0, 1.0]);

            let volume = open_volume(&path).unwrap();
            assert_eq!(volume.data(), labels.data().mapv(f32::from));
        }

        // NIfTI 分支同样校验标签值.
        let mut frac = xyz.mapv(f32::from);
        frac[(2, 1, 0)] = 1.5;
        let path = dir.path().join("frac.nii");
        WriterOptions::new(&path)
            .reference_header(&header)
            .write_nifti(&frac)
            .unwrap();
        match open_labels(&path) {
            Err(LoadError::InvalidLabel { pos, value }) => {
                assert_eq!(pos, (0, 1, 2));
                assert_eq!(value, 1.5);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let mhd = write_header(dir.path(), "gone", "MET_UCHAR");
        assert!(matches!(
            open_labels(&mhd),
            Err(LoadError::MetaImage {
                source: MetaImageError::Io { .. },
                ..
            })
        ));
    }
}
