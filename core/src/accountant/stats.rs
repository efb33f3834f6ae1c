use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::driver::GroupState;

/// Batch-wide counters, one instance per pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub discovered: usize,
    pub already_done: usize,
    pub submitted: usize,
    pub succeeded: usize,
    /// Failed items, including inputs rejected for output name collisions.
    pub failed: usize,
    pub failed_groups: usize,
    pub cancelled_groups: usize,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl RunStats {
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Enough identity to re-run a single item later.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub input: PathBuf,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group_id: String,
    pub state: GroupState,
    pub discovered: usize,
    pub already_done: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub failures: Vec<FailureRecord>,
    /// Why the group could not be enumerated, for `Failed` groups.
    pub error: Option<String>,
}

impl GroupReport {
    pub(crate) fn new(group_id: &str, state: GroupState) -> Self {
        Self {
            group_id: group_id.to_string(),
            state,
            discovered: 0,
            already_done: 0,
            submitted: 0,
            succeeded: 0,
            failed: 0,
            duration_ms: 0,
            failures: Vec::new(),
            error: None,
        }
    }
}

/// Final report of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub pipeline: String,
    pub stats: RunStats,
    pub groups: Vec<GroupReport>,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0 || self.stats.failed_groups > 0
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureRecord)> {
        self.groups
            .iter()
            .flat_map(|g| g.failures.iter().map(move |f| (g.group_id.as_str(), f)))
    }
}
