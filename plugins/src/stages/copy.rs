use std::path::{Path, PathBuf};

use async_trait::async_trait;
use imgbatch_core::api::{SharedReference, StageError, TransformStage};

/// Copies each input (file or directory) unchanged. Useful for dry
/// pipelines and for mirroring a subset of a dataset.
#[derive(Debug, Default)]
pub struct CopyStage;

impl CopyStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransformStage for CopyStage {
    type Artifact = PathBuf;

    fn name(&self) -> &str {
        "copy"
    }

    async fn transform(
        &self,
        input: &Path,
        _reference: &SharedReference,
    ) -> Result<PathBuf, StageError> {
        match tokio::fs::metadata(input).await {
            Ok(_) => Ok(input.to_path_buf()),
            Err(e) => Err(StageError::InvalidInput(format!("{}: {e}", input.display()))),
        }
    }

    async fn persist(&self, artifact: PathBuf, destination: &Path) -> Result<(), StageError> {
        super::copy_path(&artifact, destination).await
    }
}
