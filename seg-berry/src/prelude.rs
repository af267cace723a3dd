//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{ImgWriteRaw, ImgWriteVis, LabelSlice, ScanSlice};
pub use crate::data::window::IntensityWindow;
pub use crate::data::{Geometry, LabelVolume, SegPair, Study, Volume, VolumeAttr};

pub use crate::consts::gray::BACKGROUND;

pub use crate::diff::{DiffError, LabelSet, LabelSetPolicy, SegDiff};
pub use crate::io::LoadError;
pub use crate::overlay::{FallbackPolicy, Layer, Overlays, Palette, Palettes, Rgb};
pub use crate::render::{FrameRenderer, Layout, RenderOptions};
pub use crate::viewer::{Command, FrameController, SliceSource};
