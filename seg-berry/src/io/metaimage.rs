//! MetaImage (`.mhd` + `.raw` / `.mha`) 读写.
//!
//! 头部为若干 `Key = Value` 文本行, 以 `ElementDataFile` 结尾.
//! 数据按 x 变化最快的顺序存储, 读入后即为 (z, h, w) 的 C 顺序数组.

use std::fmt::{self, Display};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array3, ArrayView3};
use num::ToPrimitive;
use thiserror::Error;

use crate::data::Geometry;

/// MetaImage 解析与读写错误.
#[derive(Debug, Error)]
pub enum MetaImageError {
    /// 读写文件失败.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// 出错的文件.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 缺少必需的头部字段.
    #[error("missing header key `{0}`")]
    MissingKey(&'static str),

    /// 头部字段的取值无法解析或不受支持.
    #[error("invalid value `{value}` for header key `{key}`")]
    InvalidValue {
        /// 字段名.
        key: String,
        /// 原始取值.
        value: String,
    },

    /// 不支持的体素类型.
    #[error("unsupported element type `{0}`")]
    UnsupportedElementType(String),

    /// 数据字节数少于头部声明的大小.
    #[error("truncated data: expected {expected} bytes, found {found}")]
    Truncated {
        /// 头部声明的字节数.
        expected: usize,
        /// 实际可用的字节数.
        found: usize,
    },

    /// zlib 压缩或解压失败.
    #[error("zlib stream error: {0}")]
    Zlib(std::io::Error),

    /// 数据个数与 `DimSize` 不符.
    #[error("data does not fit DimSize: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

/// 体素类型, 对应头部字段 `ElementType`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// `MET_CHAR`, `i8`.
    Char,
    /// `MET_UCHAR`, `u8`.
    UChar,
    /// `MET_SHORT`, `i16`.
    Short,
    /// `MET_USHORT`, `u16`.
    UShort,
    /// `MET_INT`, `i32`.
    Int,
    /// `MET_UINT`, `u32`.
    UInt,
    /// `MET_LONG_LONG`, `i64`.
    LongLong,
    /// `MET_ULONG_LONG`, `u64`.
    ULongLong,
    /// `MET_FLOAT`, `f32`.
    Float,
    /// `MET_DOUBLE`, `f64`.
    Double,
}

impl ElementType {
    /// 头部中的写法.
    pub const fn tag(self) -> &'static str {
        match self {
            ElementType::Char => "MET_CHAR",
            ElementType::UChar => "MET_UCHAR",
            ElementType::Short => "MET_SHORT",
            ElementType::UShort => "MET_USHORT",
            ElementType::Int => "MET_INT",
            ElementType::UInt => "MET_UINT",
            ElementType::LongLong => "MET_LONG_LONG",
            ElementType::ULongLong => "MET_ULONG_LONG",
            ElementType::Float => "MET_FLOAT",
            ElementType::Double => "MET_DOUBLE",
        }
    }

    /// 单个体素的字节数.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Char | ElementType::UChar => 1,
            ElementType::Short | ElementType::UShort => 2,
            ElementType::Int | ElementType::UInt | ElementType::Float => 4,
            ElementType::LongLong | ElementType::ULongLong | ElementType::Double => 8,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ElementType {
    type Err = MetaImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MET_CHAR" => ElementType::Char,
            "MET_UCHAR" => ElementType::UChar,
            "MET_SHORT" => ElementType::Short,
            "MET_USHORT" => ElementType::UShort,
            "MET_INT" => ElementType::Int,
            "MET_UINT" => ElementType::UInt,
            "MET_LONG_LONG" => ElementType::LongLong,
            "MET_ULONG_LONG" => ElementType::ULongLong,
            "MET_FLOAT" => ElementType::Float,
            "MET_DOUBLE" => ElementType::Double,
            other => return Err(MetaImageError::UnsupportedElementType(other.to_owned())),
        })
    }
}

/// 数据位置, 对应头部字段 `ElementDataFile`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataFile {
    /// 数据紧跟在头部之后 (`LOCAL`).
    Local,
    /// 独立的数据文件, 路径相对于头部文件所在目录.
    External(PathBuf),
}

/// 解析后的 MetaImage 头部. 所有向量字段均按文件中的 (x, y, z) 顺序保存.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaHeader {
    /// `DimSize`.
    pub dim_size: [usize; 3],
    /// `ElementSpacing`, 缺省时取 `ElementSize`, 再缺省时为 1.
    pub spacing: [f64; 3],
    /// `Offset` (或 `Origin`, `Position`), 缺省时为 0.
    pub offset: [f64; 3],
    /// `ElementType`.
    pub element_type: ElementType,
    /// 是否为大端字节序.
    pub msb: bool,
    /// `CompressedData`.
    pub compressed: bool,
    /// `CompressedDataSize`.
    pub compressed_size: Option<usize>,
    /// `HeaderSize`. `-1` 表示数据位于文件末尾.
    pub header_size: i64,
    /// `ElementDataFile`.
    pub data_file: DataFile,
}

impl MetaHeader {
    /// 体素个数. 溢出时饱和为 `usize::MAX`.
    #[inline]
    pub fn len(&self) -> usize {
        self.dim_size
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .unwrap_or(usize::MAX)
    }

    /// 数据字节数. 乘积溢出或超过 `isize::MAX` 时返回 `None`.
    pub fn byte_len(&self) -> Option<usize> {
        self.dim_size
            .iter()
            .try_fold(self.element_type.size(), |acc, &n| acc.checked_mul(n))
            .filter(|&n| isize::try_from(n).is_ok())
    }

    /// 是否不含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 数据形状 (z, h, w).
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        let [x, y, z] = self.dim_size;
        (z, y, x)
    }

    /// 转换为 (z, h, w) 顺序的几何信息.
    pub fn geometry(&self) -> Geometry {
        let [sx, sy, sz] = self.spacing;
        let [ox, oy, oz] = self.offset;
        Geometry::new(self.shape(), [sz, sy, sx], [oz, oy, ox])
    }

    /// 解析头部文本. 返回头部以及头部结束处 (`ElementDataFile` 行之后) 的字节偏移.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), MetaImageError> {
        let mut fields = HeaderFields::default();
        let mut pos = 0;
        let mut data_file = None;

        while pos < bytes.len() && data_file.is_none() {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| pos + i + 1);
            let line = String::from_utf8_lossy(&bytes[pos..end]);
            pos = end;

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key == "ElementDataFile" {
                data_file = Some(if value.eq_ignore_ascii_case("LOCAL") {
                    DataFile::Local
                } else {
                    DataFile::External(PathBuf::from(value))
                });
            } else {
                fields.set(key, value)?;
            }
        }

        let data_file = data_file.ok_or(MetaImageError::MissingKey("ElementDataFile"))?;
        Ok((fields.finish(data_file)?, pos))
    }
}

/// 解析过程中的头部字段.
#[derive(Default)]
struct HeaderFields {
    ndims: Option<usize>,
    dim_size: Option<[usize; 3]>,
    spacing: Option<[f64; 3]>,
    element_size: Option<[f64; 3]>,
    offset: Option<[f64; 3]>,
    element_type: Option<ElementType>,
    msb: bool,
    compressed: bool,
    compressed_size: Option<usize>,
    header_size: i64,
}

impl HeaderFields {
    fn set(&mut self, key: &str, value: &str) -> Result<(), MetaImageError> {
        match key {
            "NDims" => {
                let n = parse_one(key, value)?;
                if n != 3 {
                    return Err(invalid(key, value));
                }
                self.ndims = Some(n);
            }
            "DimSize" => self.dim_size = Some(parse_three(key, value)?),
            "ElementSpacing" => self.spacing = Some(parse_three(key, value)?),
            "ElementSize" => self.element_size = Some(parse_three(key, value)?),
            "Offset" | "Origin" | "Position" => self.offset = Some(parse_three(key, value)?),
            "ElementType" => self.element_type = Some(value.parse()?),
            "ElementNumberOfChannels" => {
                if parse_one::<usize>(key, value)? != 1 {
                    return Err(invalid(key, value));
                }
            }
            "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                self.msb = parse_bool(key, value)?
            }
            "BinaryData" => {
                if !parse_bool(key, value)? {
                    return Err(invalid(key, value));
                }
            }
            "CompressedData" => self.compressed = parse_bool(key, value)?,
            "CompressedDataSize" => self.compressed_size = Some(parse_one(key, value)?),
            "HeaderSize" => self.header_size = parse_one(key, value)?,
            _ => log::debug!("Ignoring MetaImage header key `{key}`"),
        }
        Ok(())
    }

    fn finish(self, data_file: DataFile) -> Result<MetaHeader, MetaImageError> {
        self.ndims.ok_or(MetaImageError::MissingKey("NDims"))?;
        let header = MetaHeader {
            dim_size: self.dim_size.ok_or(MetaImageError::MissingKey("DimSize"))?,
            spacing: self.spacing.or(self.element_size).unwrap_or([1.0; 3]),
            offset: self.offset.unwrap_or([0.0; 3]),
            element_type: self
                .element_type
                .ok_or(MetaImageError::MissingKey("ElementType"))?,
            msb: self.msb,
            compressed: self.compressed,
            compressed_size: self.compressed_size,
            header_size: self.header_size,
            data_file,
        };
        header.byte_len().ok_or_else(|| too_large(&header))?;
        Ok(header)
    }
}

#[inline]
fn invalid(key: &str, value: &str) -> MetaImageError {
    MetaImageError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn too_large(header: &MetaHeader) -> MetaImageError {
    let [x, y, z] = header.dim_size;
    invalid("DimSize", &format!("{x} {y} {z}"))
}

fn parse_one<T: FromStr>(key: &str, value: &str) -> Result<T, MetaImageError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_three<T: FromStr + Copy>(key: &str, value: &str) -> Result<[T; 3], MetaImageError> {
    let items = value
        .split_whitespace()
        .map(|v| v.parse::<T>().map_err(|_| invalid(key, value)))
        .collect::<Result<Vec<T>, _>>()?;
    match items.as_slice() {
        &[x, y, z] => Ok([x, y, z]),
        _ => Err(invalid(key, value)),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, MetaImageError> {
    match value {
        v if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        v if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// 可以直接从字节序列解码的体素类型.
pub trait Element: ToPrimitive + Copy {
    /// 对应的 `ElementType`.
    const TYPE: ElementType;

    /// 从恰好 `TYPE.size()` 个字节中解码.
    fn decode(bytes: &[u8], msb: bool) -> Self;

    /// 以小端字节序追加到 `out`.
    fn encode_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($($t:ty => $tag:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const TYPE: ElementType = ElementType::$tag;

                #[inline]
                fn decode(bytes: &[u8], msb: bool) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    if msb {
                        <$t>::from_be_bytes(buf)
                    } else {
                        <$t>::from_le_bytes(buf)
                    }
                }

                #[inline]
                fn encode_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element! {
    i8 => Char,
    u8 => UChar,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => LongLong,
    u64 => ULongLong,
    f32 => Float,
    f64 => Double,
}

/// 按 `header` 的字节序将 `bytes` 解码为 `T`, 再用 `f` 逐个转换.
/// `f` 的第一个参数为体素在展平数据中的下标.
fn decode_as<T, O, E, F>(bytes: &[u8], msb: bool, mut f: F) -> Result<Vec<O>, E>
where
    T: Element,
    F: FnMut(usize, T) -> Result<O, E>,
{
    bytes
        .chunks_exact(T::TYPE.size())
        .enumerate()
        .map(|(i, b)| f(i, T::decode(b, msb)))
        .collect()
}

/// 将任意 `ElementType` 的原始数据解码为 `O`.
///
/// `convert` 接收体素下标和以 [`ToPrimitive`] 表示的原始值.
pub fn decode_elements<O, E>(
    bytes: &[u8],
    element_type: ElementType,
    msb: bool,
    mut convert: impl FnMut(usize, &dyn ToPrimitive) -> Result<O, E>,
) -> Result<Vec<O>, E> {
    macro_rules! dispatch {
        ($($tag:ident => $t:ty),*) => {
            match element_type {
                $(ElementType::$tag => decode_as::<$t, _, _, _>(bytes, msb, |i, v| convert(i, &v)),)*
            }
        };
    }
    dispatch!(
        Char => i8,
        UChar => u8,
        Short => i16,
        UShort => u16,
        Int => i32,
        UInt => u32,
        LongLong => i64,
        ULongLong => u64,
        Float => f32,
        Double => f64
    )
}

/// 读取 `path` 处的 MetaImage 头部及原始 (已解压的) 数据字节.
pub fn read_raw(path: &Path) -> Result<(MetaHeader, Vec<u8>), MetaImageError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source| MetaImageError::Io { path: p, source }
    };

    let file = fs::read(path).map_err(io_err(path))?;
    let (header, header_end) = MetaHeader::parse(&file)?;

    let mut payload = match &header.data_file {
        DataFile::Local => file[header_end..].to_vec(),
        DataFile::External(name) => {
            let data_path = path.parent().unwrap_or_else(|| Path::new("")).join(name);
            fs::read(&data_path).map_err(io_err(&data_path))?
        }
    };

    let expected = header.byte_len().ok_or_else(|| too_large(&header))?;
    match header.header_size {
        -1 if !header.compressed => {
            let skip = payload.len().checked_sub(expected).ok_or(MetaImageError::Truncated {
                expected,
                found: payload.len(),
            })?;
            payload.drain(..skip);
        }
        n if n > 0 => {
            let skip = (n as usize).min(payload.len());
            payload.drain(..skip);
        }
        0 => {}
        n => return Err(invalid("HeaderSize", &n.to_string())),
    }

    if header.compressed {
        let compressed = match header.compressed_size {
            Some(n) if n <= payload.len() => &payload[..n],
            _ => &payload[..],
        };
        // 解压量以头部声明的大小为上限, 不按头部预分配.
        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed)
            .take(expected as u64)
            .read_to_end(&mut inflated)
            .map_err(MetaImageError::Zlib)?;
        payload = inflated;
    }

    if payload.len() < expected {
        return Err(MetaImageError::Truncated {
            expected,
            found: payload.len(),
        });
    }
    payload.truncate(expected);
    log::debug!(
        "Read {} ({}, {:?}, {} bytes)",
        path.display(),
        header.element_type,
        header.dim_size,
        expected
    );
    Ok((header, payload))
}

/// 以 MetaImage 格式写出 (z, h, w) 组织的数据, 小端字节序.
///
/// - 扩展名为 `.mha` 时, 数据紧跟头部写入同一文件.
/// - 否则写出头部文件 `path` 及其同名的 `.raw` (压缩时为 `.zraw`) 数据文件.
pub fn write<T: Element>(
    path: &Path,
    data: ArrayView3<T>,
    geometry: &Geometry,
    compressed: bool,
) -> Result<(), MetaImageError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source| MetaImageError::Io { path: p, source }
    };

    let mut raw = Vec::with_capacity(data.len() * T::TYPE.size());
    data.iter().for_each(|v| v.encode_le(&mut raw));
    if compressed {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).map_err(MetaImageError::Zlib)?;
        raw = encoder.finish().map_err(MetaImageError::Zlib)?;
    }

    let local = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mha"));
    let data_path = path.with_extension(if compressed { "zraw" } else { "raw" });
    let data_file = if local {
        "LOCAL".to_owned()
    } else {
        data_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| invalid("ElementDataFile", &data_path.display().to_string()))?
    };

    let (z, h, w) = data.dim();
    let [sz, sy, sx] = geometry.spacing();
    let [oz, oy, ox] = geometry.origin();
    let mut header = format!(
        "ObjectType = Image\n\
         NDims = 3\n\
         BinaryData = True\n\
         BinaryDataByteOrderMSB = False\n\
         CompressedData = {}\n",
        if compressed { "True" } else { "False" }
    );
    if compressed {
        header.push_str(&format!("CompressedDataSize = {}\n", raw.len()));
    }
    header.push_str(&format!(
        "Offset = {ox} {oy} {oz}\n\
         ElementSpacing = {sx} {sy} {sz}\n\
         DimSize = {w} {h} {z}\n\
         ElementType = {}\n\
         ElementDataFile = {data_file}\n",
        T::TYPE
    ));

    if local {
        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(&raw);
        fs::write(path, bytes).map_err(io_err(path))?;
    } else {
        fs::write(path, header).map_err(io_err(path))?;
        fs::write(&data_path, raw).map_err(io_err(&data_path))?;
    }
    Ok(())
}

/// 将 (z, h, w) 组织的扁平数据组装为数组.
pub(crate) fn into_array<T>(header: &MetaHeader, values: Vec<T>) -> Result<Array3<T>, MetaImageError> {
    Ok(Array3::from_shape_vec(header.shape(), values)?)
}
