//! The per-item transformation contract. The engine never looks inside an
//! artifact; it only sequences `transform`, `persist` and the final rename.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StageError;
use crate::reference::SharedReference;

#[async_trait]
pub trait TransformStage: Send + Sync + 'static {
    /// Whatever `transform` produces and `persist` consumes.
    type Artifact: Send + 'static;

    fn name(&self) -> &str;

    /// Produce the artifact for one input. Must not write under the item's
    /// output name and must only read from `reference`. CPU-heavy in-process
    /// work belongs on `tokio::task::spawn_blocking`.
    async fn transform(
        &self,
        input: &Path,
        reference: &SharedReference,
    ) -> Result<Self::Artifact, StageError>;

    /// Write a successfully produced artifact to `destination`. The engine
    /// renames `destination` to the real output name afterwards.
    async fn persist(&self, artifact: Self::Artifact, destination: &Path)
        -> Result<(), StageError>;
}
