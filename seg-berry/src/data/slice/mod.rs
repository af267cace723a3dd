//! 标签/扫描切片对象的操作.

mod core;
mod save;

pub use core::{LabelSlice, ScanSlice};

pub use save::{ImgWriteRaw, ImgWriteVis};
