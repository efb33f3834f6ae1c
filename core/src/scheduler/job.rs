use std::path::PathBuf;
use std::time::Duration;

use crate::error::ItemError;
use crate::types::WorkItem;

/// Final state of one submitted item.
#[derive(Debug)]
pub enum JobStatus {
    Success { output: PathBuf },
    Failure(ItemError),
}

/// A drained job: the item it ran for, how it ended, and how long its stage
/// held a worker slot.
#[derive(Debug)]
pub struct JobOutcome {
    pub item: WorkItem,
    pub status: JobStatus,
    pub duration: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Success { .. })
    }

    pub fn error(&self) -> Option<&ItemError> {
        match &self.status {
            JobStatus::Failure(e) => Some(e),
            JobStatus::Success { .. } => None,
        }
    }
}
