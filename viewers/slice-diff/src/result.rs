//! 比对结果.

use std::io::{self, Write};
use std::path::PathBuf;

use seg_berry::diff::SegDiff;

/// 单个标签的体素统计.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelCounts {
    pub label: u8,
    pub intersection: usize,
    pub truth_only: usize,
    pub computed_only: usize,
}

#[inline]
fn count<'a>(mask: impl IntoIterator<Item = &'a bool>) -> usize {
    mask.into_iter().filter(|&&b| b).count()
}

/// 将 `c` 的结果写进 `w` 中.
fn describe_into<W: Write>(c: &LabelCounts, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Label {}:", c.label)?;
    writeln!(w, "{S4}Intersection: {} voxels", c.intersection)?;
    writeln!(w, "{S4}Truth only: {} voxels", c.truth_only)?;
    write!(w, "{S4}Computed only: {} voxels", c.computed_only)
}

/// 一次运行的最终结果.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// 数据形状 (z, h, w).
    pub shape: [usize; 3],
    pub labels: Vec<LabelCounts>,
    /// 导出的帧文件.
    pub frames: Vec<PathBuf>,
}

impl RunSummary {
    pub fn from_diff(diff: &SegDiff) -> Self {
        let labels = diff
            .iter()
            .map(|(label, m)| LabelCounts {
                label,
                intersection: count(&m.intersection),
                truth_only: count(&m.truth_only),
                computed_only: count(&m.computed_only),
            })
            .collect();
        Self {
            shape: diff.shape(),
            labels,
            frames: Vec::new(),
        }
    }

    /// 将全部结果写进 `w` 中.
    fn report_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", utils::SEP)?;
        writeln!(w, "Shape (z, h, w): {:?}", self.shape)?;
        if self.labels.is_empty() {
            writeln!(w, "No foreground labels to compare")?;
        }
        writeln!(w, "{}", utils::SEP)?;

        for c in self.labels.iter() {
            describe_into(c, w)?;
            writeln!(w)?;
            writeln!(w, "{}", utils::SEP)?;
        }

        match self.frames.as_slice() {
            [] => writeln!(w, "No frames written"),
            [only] => writeln!(w, "Wrote {}", only.display()),
            [first, .., last] => writeln!(
                w,
                "Wrote {} frames: {} .. {}",
                self.frames.len(),
                first.display(),
                last.display()
            ),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        self.report_into(&mut io::stdout().lock())
    }
}
