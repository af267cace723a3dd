#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 逐切片比对医学体数据上的真值分割与计算 (预测) 分割,
//! 并将差异编码为彩色叠加图.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 体数据一律按照 (z, h, w) 组织, 即 "切片, 行, 列". 文件中的 (x, y, z) 顺序由加载器转换.
//! 2. 标签值为 `u8`, `0` 代表背景. 加载时会拒绝负数, 非整数或大于 255 的值.
//! 3. 可恢复的错误以 `Result` 返回. 仅在索引越界等调用方违约时 panic.
//!
//! # 模块
//!
//! ### 数据加载 ✅
//!
//! MetaImage (`.mhd` + `.raw`, `.mha`, 可选 zlib 压缩) 与 NIfTI (`.nii`, `.nii.gz`).
//!
//! 实现位于 `seg-berry/src/io`.
//!
//! ### 分割差异 ✅
//!
//! 标签集合, 逐标签掩码, 以及交集/仅真值/仅计算三分.
//!
//! 实现位于 `seg-berry/src/diff`.
//!
//! ### 叠加图编码与调色板 ✅
//!
//! 按显式映射或按秩为每个标签取色, 颜色不足时报错或回退为中性灰.
//!
//! 实现位于 `seg-berry/src/overlay`.
//!
//! ### 渲染与导出 ✅
//!
//! 三种帧布局, PNG 导出. 启用 `rayon` feature 时可并行导出.
//!
//! 实现位于 `seg-berry/src/render`.
//!
//! ### 切片浏览 ✅
//!
//! 帧控制器, 取代绘图脚本中的全局滑块状态.
//!
//! 实现位于 `seg-berry/src/viewer.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D 体数据基础数据结构.
mod data;

pub use data::{
    Geometry, ImgWriteRaw, ImgWriteVis, IntensityWindow, LabelSlice, LabelVolume, ScanSlice,
    SegPair, Study, Volume, VolumeAttr,
};

pub mod consts;

pub mod diff;

pub mod overlay;

pub mod io;

pub mod render;

pub mod viewer;

pub mod prelude;
