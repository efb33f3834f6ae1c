use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::error::ItemError;
use crate::types::WorkItem;

use super::job::{JobOutcome, JobStatus};

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Upper bound on concurrently running items.
    pub max_workers: usize,
    /// Per-item deadline; `None` lets an item run indefinitely. On expiry the
    /// job future is dropped; blocking work inside a stage must stop when
    /// that happens.
    pub item_timeout: Option<Duration>,
}

impl PoolOptions {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            item_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }
}

struct Job {
    item: WorkItem,
    handle: JoinHandle<(JobStatus, Duration)>,
}

impl Drop for Job {
    fn drop(&mut self) {
        // No-op once the task has finished; otherwise stops it from outliving
        // the pool.
        self.handle.abort();
    }
}

/// Fixed-size pool scoped to one group: `open`, `submit` every item, then
/// `drain`, which returns exactly one outcome per submission and closes the
/// pool. Dropping a pool that was not drained aborts its outstanding jobs.
pub struct WorkerPool {
    sem: Arc<Semaphore>,
    opts: PoolOptions,
    jobs: Vec<Job>,
}

impl WorkerPool {
    pub fn open(opts: PoolOptions) -> Self {
        let max_workers = opts.max_workers.max(1);
        tracing::debug!(max_workers, timeout = ?opts.item_timeout, "worker pool opened");
        Self {
            sem: Arc::new(Semaphore::new(max_workers)),
            opts: PoolOptions {
                max_workers,
                ..opts
            },
            jobs: Vec::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.opts.max_workers
    }

    /// Number of jobs submitted and not yet drained.
    pub fn submitted(&self) -> usize {
        self.jobs.len()
    }

    /// Schedule `work` for `item`. The job starts as soon as a slot is free;
    /// its slot is held until `work` resolves, panics or times out.
    pub fn submit<F>(&mut self, item: WorkItem, work: F)
    where
        F: Future<Output = Result<PathBuf, ItemError>> + Send + 'static,
    {
        let sem = self.sem.clone();
        let timeout = self.opts.item_timeout;
        let staging = item.staging_path();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return (
                    JobStatus::Failure(ItemError::WorkerCrashed("worker pool closed".into())),
                    Duration::ZERO,
                );
            };
            let started = Instant::now();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(res) => res,
                    Err(_) => {
                        remove_staging(&staging).await;
                        Err(ItemError::TimedOut(limit))
                    }
                },
                None => work.await,
            };
            let status = match result {
                Ok(output) => JobStatus::Success { output },
                Err(e) => JobStatus::Failure(e),
            };
            (status, started.elapsed())
        });

        self.jobs.push(Job { item, handle });
    }

    /// Wait for every submitted job, in completion order. `on_complete` sees
    /// each outcome as soon as it is available.
    pub async fn drain<C>(self, mut on_complete: C) -> Vec<JobOutcome>
    where
        C: FnMut(&JobOutcome),
    {
        let WorkerPool { sem, jobs, .. } = self;
        let expected = jobs.len();

        let mut futs: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|mut job| async move {
                let joined = (&mut job.handle).await;
                (job.item.clone(), joined)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(expected);
        while let Some((item, joined)) = futs.next().await {
            let outcome = match joined {
                Ok((status, duration)) => JobOutcome {
                    item,
                    status,
                    duration,
                },
                Err(e) => {
                    remove_staging(&item.staging_path()).await;
                    JobOutcome {
                        item,
                        status: JobStatus::Failure(ItemError::WorkerCrashed(join_error_reason(e))),
                        duration: Duration::ZERO,
                    }
                }
            };
            on_complete(&outcome);
            outcomes.push(outcome);
        }

        sem.close();
        debug_assert_eq!(outcomes.len(), expected);
        tracing::debug!(jobs = expected, "worker pool drained");
        outcomes
    }
}

fn join_error_reason(e: JoinError) -> String {
    if e.is_cancelled() {
        return "job cancelled".to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

/// Best-effort removal of a staging file or directory.
pub(crate) async fn remove_staging(path: &Path) {
    let removed = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = removed {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove staging artifact");
    }
}
