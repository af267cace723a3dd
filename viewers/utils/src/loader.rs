//! 命令行输入的路径解析.

use std::path::{Path, PathBuf};

use crate::InputError;

/// 未指定扩展名时默认的扩展名.
pub const DEFAULT_EXTENSION: &str = "mhd";

/// 解析 `folder` 下名为 `name` 的输入文件路径. `name` 没有扩展名时补全为 `.mhd`.
pub fn resolve_input<P: AsRef<Path>>(folder: P, name: &str) -> PathBuf {
    let path = folder.as_ref().join(name);
    if path.extension().is_none() {
        path.with_extension(DEFAULT_EXTENSION)
    } else {
        path
    }
}

/// 去掉 `.mhd`, `.mha`, `.nii`, `.nii.gz` 等扩展名后的文件名, 用作导出帧的前缀.
pub fn basename(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_owned(),
        _ => name.to_owned(),
    }
}

/// 一次比对的三个输入文件.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudyPaths {
    /// 强度体.
    pub volume: PathBuf,

    /// 真值分割.
    pub truth: PathBuf,

    /// 计算分割.
    pub computed: PathBuf,
}

impl StudyPaths {
    /// 在 `folder` 下解析三个输入文件.
    ///
    /// 任一文件不存在时返回 `Err(InputError::MissingFiles)`, 其中列出 **所有** 缺失的文件.
    pub fn resolve<P: AsRef<Path>>(
        folder: P,
        volume: &str,
        truth: &str,
        computed: &str,
    ) -> Result<Self, InputError> {
        let folder = folder.as_ref();
        let paths = Self {
            volume: resolve_input(folder, volume),
            truth: resolve_input(folder, truth),
            computed: resolve_input(folder, computed),
        };
        let missing: Vec<PathBuf> = [&paths.volume, &paths.truth, &paths.computed]
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(paths)
        } else {
            Err(InputError::MissingFiles(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_input() {
        assert_eq!(resolve_input("data", "volume-14"), Path::new("data/volume-14.mhd"));
        assert_eq!(resolve_input("data", "seg.mha"), Path::new("data/seg.mha"));
        assert_eq!(resolve_input("data", "seg.nii.gz"), Path::new("data/seg.nii.gz"));
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename(Path::new("a/volume-14.mhd")), "volume-14");
        assert_eq!(basename(Path::new("case.nii.gz")), "case");
        assert_eq!(basename(Path::new("plain")), "plain");
        assert_eq!(basename(Path::new(".hidden")), ".hidden");
    }

    #[test]
    fn test_missing_files_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("volume.mhd"), "").unwrap();

        match StudyPaths::resolve(dir.path(), "volume", "truth", "computed.mhd") {
            Err(InputError::MissingFiles(missing)) => assert_eq!(
                missing,
                vec![dir.path().join("truth.mhd"), dir.path().join("computed.mhd")]
            ),
            other => panic!("unexpected: {other:?}"),
        }

        fs::write(dir.path().join("truth.mhd"), "").unwrap();
        fs::write(dir.path().join("computed.mhd"), "").unwrap();
        let paths = StudyPaths::resolve(dir.path(), "volume", "truth", "computed").unwrap();
        assert_eq!(paths.truth, dir.path().join("truth.mhd"));
    }
}
