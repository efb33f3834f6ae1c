use std::path::{Path, PathBuf};

use crate::walker::staging_name;

/// One input unit scheduled for transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input_path: PathBuf,
    pub group_id: String,
    pub output_name: String,
    pub output_dir: PathBuf,
}

impl WorkItem {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }

    /// Hidden sibling of the output the artifact is written to before the
    /// final rename.
    pub fn staging_path(&self) -> PathBuf {
        self.output_dir.join(staging_name(&self.output_name))
    }

    pub fn input_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// A partition of the dataset processed as one unit: its items run in
/// parallel, groups run one after another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    /// Path of the group relative to the input root, `/`-separated.
    pub id: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl GroupSpec {
    pub fn new(id: impl Into<String>, input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Whether `id` names a directory below the roots: at least one segment
    /// and no `.` or `..` segments.
    pub fn is_valid_id(id: &str) -> bool {
        let mut segments = id.split('/').filter(|s| !s.is_empty()).peekable();
        segments.peek().is_some() && segments.all(|s| s != "." && s != ".." && !s.contains('\\'))
    }

    /// Group rooted at `input_root/id`, mirrored under `output_root/id`.
    pub fn under(id: &str, input_root: &Path, output_root: &Path) -> Self {
        let rel: PathBuf = id.split('/').filter(|s| !s.is_empty()).collect();
        Self::new(id, input_root.join(&rel), output_root.join(&rel))
    }
}
