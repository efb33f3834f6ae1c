mod command;
mod copy;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use imgbatch_core::api::{SharedReference, StageError, TransformStage};

pub use command::{CommandStage, ScratchOutput};
pub use copy::CopyStage;

/// Stage selected by `[pipelines.stage] kind = ...`.
pub enum ConfiguredStage {
    Command(CommandStage),
    Copy(CopyStage),
}

pub enum StagedArtifact {
    Scratch(ScratchOutput),
    Source(PathBuf),
}

#[async_trait]
impl TransformStage for ConfiguredStage {
    type Artifact = StagedArtifact;

    fn name(&self) -> &str {
        match self {
            Self::Command(s) => s.name(),
            Self::Copy(s) => s.name(),
        }
    }

    async fn transform(
        &self,
        input: &Path,
        reference: &SharedReference,
    ) -> Result<StagedArtifact, StageError> {
        match self {
            Self::Command(s) => s.transform(input, reference).await.map(StagedArtifact::Scratch),
            Self::Copy(s) => s.transform(input, reference).await.map(StagedArtifact::Source),
        }
    }

    async fn persist(&self, artifact: StagedArtifact, destination: &Path) -> Result<(), StageError> {
        match (self, artifact) {
            (Self::Command(s), StagedArtifact::Scratch(a)) => s.persist(a, destination).await,
            (Self::Copy(s), StagedArtifact::Source(a)) => s.persist(a, destination).await,
            _ => Err(StageError::Failed("artifact produced by another stage".into())),
        }
    }
}

/// Move `src` (file or directory) to `dest`, copying when a rename is not
/// possible (scratch space on another filesystem).
pub(crate) async fn move_path(src: &Path, dest: &Path) -> Result<(), StageError> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    copy_path(src, dest).await
}

/// Copy `src` (file or directory) to `dest` on the blocking pool.
///
/// Dropping the returned future (item timeout, aborted job) stops the copy
/// at the next chunk boundary; the blocking task then removes what it wrote
/// at `dest` itself, so nothing reappears after the caller has cleaned up.
pub(crate) async fn copy_path(src: &Path, dest: &Path) -> Result<(), StageError> {
    let stop = Arc::new(AtomicBool::new(false));
    let _on_drop = StopOnDrop(stop.clone());
    let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let copied = copy_recursive(&src, &dest, &stop);
        if copied.is_err() && stop.load(Ordering::SeqCst) {
            discard(&dest);
        }
        copied
    })
    .await
    .map_err(|e| StageError::Failed(format!("copy task failed: {e}")))?
    .map_err(StageError::Io)
}

struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

const COPY_CHUNK: usize = 1 << 20;

fn stopped(stop: &AtomicBool) -> std::io::Result<()> {
    if stop.load(Ordering::SeqCst) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "copy abandoned",
        ));
    }
    Ok(())
}

fn copy_recursive(src: &Path, dest: &Path, stop: &AtomicBool) -> std::io::Result<()> {
    stopped(stop)?;
    if std::fs::metadata(src)?.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()), stop)?;
        }
        Ok(())
    } else {
        copy_file(src, dest, stop)
    }
}

fn copy_file(src: &Path, dest: &Path, stop: &AtomicBool) -> std::io::Result<()> {
    let mut reader = std::fs::File::open(src)?;
    let mut writer = std::fs::File::create(dest)?;
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        stopped(stop)?;
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    writer.flush()
}

fn discard(path: &Path) {
    let removed = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = removed {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove abandoned copy");
    }
}
