#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use imgbatch_core::api::{CancelFlag, SharedReference, StageError, TransformStage};

/// Uppercases file contents, prefixed by the `prefix` reference when loaded.
///
/// Input names drive failures: `bad*` fails in transform, `panic*` panics,
/// `hang*` never finishes.
#[derive(Default)]
pub struct UpperStage {
    pub delay: Duration,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    /// Raised once the first transform completes.
    pub cancel_on_first: Option<CancelFlag>,
}

impl UpperStage {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformStage for UpperStage {
    type Artifact = Vec<u8>;

    fn name(&self) -> &str {
        "upper"
    }

    async fn transform(
        &self,
        input: &Path,
        reference: &SharedReference,
    ) -> Result<Vec<u8>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.starts_with("hang") {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(flag) = &self.cancel_on_first {
            flag.cancel();
        }
        if name.starts_with("panic") {
            panic!("stage bug on {name}");
        }
        if name.starts_with("bad") {
            return Err(StageError::Failed(format!("cannot convert {name}")));
        }

        let mut out = reference
            .get("prefix")
            .map(|r| r.bytes().to_vec())
            .unwrap_or_default();
        out.extend(tokio::fs::read(input).await?.to_ascii_uppercase());
        Ok(out)
    }

    async fn persist(&self, artifact: Vec<u8>, destination: &Path) -> Result<(), StageError> {
        tokio::fs::write(destination, artifact).await?;
        Ok(())
    }
}

pub fn touch(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Sorted file names directly under `dir`.
pub fn names(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    out.sort();
    out
}

/// Route engine logs through the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Dataset {
    pub tmp: tempfile::TempDir,
}

impl Dataset {
    /// `groups` is a list of `(group_id, item names)`; each item gets its own
    /// name as content.
    pub fn new(groups: &[(&str, &[&str])]) -> Self {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        for (group, items) in groups {
            let dir = tmp.path().join("in").join(group);
            std::fs::create_dir_all(&dir).unwrap();
            for item in *items {
                touch(&dir.join(item), item);
            }
        }
        Self { tmp }
    }

    pub fn input_root(&self) -> PathBuf {
        self.tmp.path().join("in")
    }

    pub fn output_root(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    pub fn output(&self, group: &str) -> PathBuf {
        self.output_root().join(group)
    }
}
