//! Bounded worker pool scheduler.
//!
//! Every residual item of a group is submitted to a [`WorkerPool`] sized for
//! the pipeline, and the pool is drained before the driver moves on. Each
//! item runs in its own task:
//!
//! ```text
//! WorkItem
//!   ↓  acquire slot (Semaphore)
//! stage.transform(input, reference)      Err → Failure(Transform)
//!   ↓
//! clear stale .name.partial
//!   ↓
//! stage.persist(artifact, .name.partial) Err → Failure(Write)
//!   ↓
//! rename(.name.partial → name)           Err → Failure(Write)
//!   ↓
//! Success { output }                     panic → Failure(WorkerCrashed)
//! ```

mod job;
mod pool;

use std::path::PathBuf;
use std::sync::Arc;

pub use job::{JobOutcome, JobStatus};
pub use pool::{PoolOptions, WorkerPool};

use crate::error::{ItemError, StageError};
use crate::reference::SharedReference;
use crate::stage::TransformStage;
use crate::types::WorkItem;

/// Run `items` through `stage` on a pool of `opts.max_workers` slots and
/// return one outcome per item, in completion order.
pub async fn run<S, C>(
    items: Vec<WorkItem>,
    stage: Arc<S>,
    reference: Arc<SharedReference>,
    opts: PoolOptions,
    on_complete: C,
) -> Vec<JobOutcome>
where
    S: TransformStage,
    C: FnMut(&JobOutcome),
{
    let mut pool = WorkerPool::open(opts);
    for item in items {
        let work = process_item(stage.clone(), reference.clone(), item.clone());
        pool.submit(item, work);
    }
    pool.drain(on_complete).await
}

/// Transform one item and make its output visible only once it is complete.
pub async fn process_item<S: TransformStage>(
    stage: Arc<S>,
    reference: Arc<SharedReference>,
    item: WorkItem,
) -> Result<PathBuf, ItemError> {
    tracing::debug!(stage = stage.name(), input = %item.input_path.display(), "transform start");

    let artifact = stage
        .transform(&item.input_path, &reference)
        .await
        .map_err(ItemError::Transform)?;

    // A staging leftover from an interrupted run must not be merged into
    // this attempt.
    let staging = item.staging_path();
    pool::remove_staging(&staging).await;
    if let Err(e) = stage.persist(artifact, &staging).await {
        pool::remove_staging(&staging).await;
        return Err(ItemError::Write(e));
    }

    let output = item.output_path();
    if let Err(e) = tokio::fs::rename(&staging, &output).await {
        pool::remove_staging(&staging).await;
        return Err(ItemError::Write(StageError::Io(e)));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    /// Uppercases file contents; inputs named `bad*` fail, `nowrite*` fail on
    /// persist.
    struct Upper;

    #[async_trait]
    impl TransformStage for Upper {
        type Artifact = Vec<u8>;

        fn name(&self) -> &str {
            "upper"
        }

        async fn transform(
            &self,
            input: &Path,
            _reference: &SharedReference,
        ) -> Result<Vec<u8>, StageError> {
            let name = input.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with("bad") {
                return Err(StageError::Failed("corrupt series".into()));
            }
            Ok(tokio::fs::read(input).await?.to_ascii_uppercase())
        }

        async fn persist(&self, artifact: Vec<u8>, destination: &Path) -> Result<(), StageError> {
            tokio::fs::write(destination, &artifact).await?;
            if destination.to_string_lossy().contains("nowrite") {
                return Err(StageError::Failed("disk full".into()));
            }
            Ok(())
        }
    }

    fn item(dir: &Path, name: &str) -> WorkItem {
        std::fs::write(dir.join("in").join(name), name.as_bytes()).unwrap();
        WorkItem {
            input_path: dir.join("in").join(name),
            group_id: "g".to_string(),
            output_name: format!("{name}.out"),
            output_dir: dir.join("out"),
        }
    }

    #[tokio::test]
    async fn test_write_after_success() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("in")).unwrap();
        std::fs::create_dir_all(tmp.path().join("out")).unwrap();
        let items = vec![
            item(tmp.path(), "good"),
            item(tmp.path(), "bad"),
            item(tmp.path(), "nowrite"),
        ];

        let outcomes = run(
            items,
            Arc::new(Upper),
            Arc::new(SharedReference::empty()),
            PoolOptions::new(2),
            |_| {},
        )
        .await;
        assert_eq!(outcomes.len(), 3);

        let out = tmp.path().join("out");
        assert_eq!(std::fs::read(out.join("good.out")).unwrap(), b"GOOD");
        assert!(!out.join("bad.out").exists());
        assert!(!out.join("nowrite.out").exists());

        // no staging leftovers either
        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);

        let kinds: Vec<_> = outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (o.item.output_name.clone(), e.kind())))
            .collect();
        assert!(kinds.contains(&("bad.out".to_string(), "transform")));
        assert!(kinds.contains(&("nowrite.out".to_string(), "write")));
    }

    /// Writes each artifact as a directory holding one file, merging into
    /// whatever is already at the destination.
    struct Series;

    #[async_trait]
    impl TransformStage for Series {
        type Artifact = Vec<u8>;

        fn name(&self) -> &str {
            "series"
        }

        async fn transform(
            &self,
            input: &Path,
            _reference: &SharedReference,
        ) -> Result<Vec<u8>, StageError> {
            Ok(tokio::fs::read(input).await?)
        }

        async fn persist(&self, artifact: Vec<u8>, destination: &Path) -> Result<(), StageError> {
            tokio::fs::create_dir_all(destination).await?;
            tokio::fs::write(destination.join("I1"), &artifact).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stale_staging_is_not_merged_into_output() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("in")).unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir_all(out.join(".series1.partial")).unwrap();
        std::fs::write(out.join(".series1.partial").join("STALE"), b"old").unwrap();

        let mut series = item(tmp.path(), "series1");
        series.output_name = "series1".to_string();

        let output = process_item(Arc::new(Series), Arc::new(SharedReference::empty()), series)
            .await
            .unwrap();
        let entries: Vec<_> = std::fs::read_dir(&output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["I1"]);
        assert!(!out.join(".series1.partial").exists());
    }

    #[tokio::test]
    async fn test_stale_staging_directory_does_not_block_file_output() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("in")).unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir_all(out.join(".a.out.partial").join("leftover")).unwrap();

        let output = process_item(
            Arc::new(Upper),
            Arc::new(SharedReference::empty()),
            item(tmp.path(), "a"),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(output).unwrap(), b"A");
    }
}
