//! Run accountant: per-item, per-group and batch bookkeeping.
//!
//! The accountant is the single owner of run statistics. It is fed from one
//! place (the driver's task, via the pool's completion callback), so nothing
//! here is shared across workers. It never fails: sink problems are the
//! sink's own, and a panicking sink is logged and skipped.

mod events;
mod stats;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;

pub use events::{BatchEvent, EventSink};
pub use stats::{BatchSummary, FailureRecord, GroupReport, RunStats};

use crate::driver::GroupState;
use crate::error::{EnumerationError, ItemError};
use crate::scheduler::{JobOutcome, JobStatus};
use crate::walker::Collision;

struct OpenGroup {
    report: GroupReport,
    started: Instant,
}

pub struct RunAccountant {
    run_id: String,
    pipeline: String,
    stats: RunStats,
    groups: Vec<GroupReport>,
    current: Option<OpenGroup>,
    sinks: Vec<Arc<dyn EventSink>>,
    started: Option<Instant>,
}

impl RunAccountant {
    pub fn new(pipeline: &str) -> Self {
        Self::with_run_id(pipeline, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_run_id(pipeline: &str, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline: pipeline.to_string(),
            stats: RunStats::default(),
            groups: Vec::new(),
            current: None,
            sinks: Vec::new(),
            started: None,
        }
    }

    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn EventSink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn batch_started(&mut self, groups: usize) {
        self.started = Some(Instant::now());
        self.stats.started_at = Some(Local::now());
        tracing::info!(
            run_id = %self.run_id,
            pipeline = %self.pipeline,
            groups,
            "batch started"
        );
        self.emit(BatchEvent::BatchStart {
            run_id: self.run_id.clone(),
            pipeline: self.pipeline.clone(),
            groups,
        });
    }

    /// Open a group's report. `to_do` items are counted as submitted.
    pub fn group_started(
        &mut self,
        group_id: &str,
        discovered: usize,
        already_done: usize,
        to_do: usize,
    ) {
        self.close_dangling();

        let mut report = GroupReport::new(group_id, GroupState::Draining);
        report.discovered = discovered;
        report.already_done = already_done;
        report.submitted = to_do;
        self.stats.discovered += discovered;
        self.stats.already_done += already_done;
        self.stats.submitted += to_do;

        tracing::info!(
            group = group_id,
            discovered,
            already_done,
            to_do,
            "group started"
        );
        self.emit(BatchEvent::GroupStart {
            run_id: self.run_id.clone(),
            group_id: group_id.to_string(),
            discovered,
            already_done,
            to_do,
        });
        self.current = Some(OpenGroup {
            report,
            started: Instant::now(),
        });
    }

    /// Record one drained outcome against the open group.
    pub fn record(&mut self, outcome: &JobOutcome) {
        let group_id = outcome.item.group_id.clone();
        let duration_ms = outcome.duration.as_millis() as u64;
        match &outcome.status {
            JobStatus::Success { output } => {
                self.stats.succeeded += 1;
                if let Some(open) = self.current.as_mut() {
                    open.report.succeeded += 1;
                }
                tracing::debug!(
                    group = %group_id,
                    input = %outcome.item.input_path.display(),
                    output = %output.display(),
                    duration_ms,
                    "item succeeded"
                );
                self.emit(BatchEvent::ItemSucceeded {
                    run_id: self.run_id.clone(),
                    group_id,
                    input: outcome.item.input_path.clone(),
                    output: output.clone(),
                    duration_ms,
                });
            }
            JobStatus::Failure(err) => {
                self.fail_item(&group_id, &outcome.item.input_path, err);
            }
        }
    }

    /// Count every input of `collision` as a failed item of the open group.
    pub fn record_collision(&mut self, group_id: &str, collision: &Collision) {
        for (idx, input) in collision.inputs.iter().enumerate() {
            let other = collision
                .inputs
                .iter()
                .enumerate()
                .find(|(i, _)| *i != idx)
                .map(|(_, p)| p.clone())
                .unwrap_or_default();
            let err = ItemError::Collision {
                output_name: collision.output_name.clone(),
                other,
            };
            self.fail_item(group_id, input, &err);
        }
    }

    pub fn group_finished(&mut self, group_id: &str) {
        let Some(open) = self.current.take() else {
            tracing::warn!(group = group_id, "group finished without being started");
            return;
        };
        let mut report = open.report;
        report.state = GroupState::Done;
        report.duration_ms = open.started.elapsed().as_millis() as u64;

        tracing::info!(
            group = group_id,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "group finished"
        );
        self.emit(BatchEvent::GroupEnd {
            run_id: self.run_id.clone(),
            report: report.clone(),
        });
        self.groups.push(report);
    }

    /// A group that could not be enumerated. None of its items are counted.
    pub fn group_failed(&mut self, group_id: &str, err: &EnumerationError) {
        self.close_dangling();
        self.stats.failed_groups += 1;
        let mut report = GroupReport::new(group_id, GroupState::Failed);
        report.error = Some(err.to_string());

        tracing::warn!(group = group_id, error = %err, "group failed");
        self.emit(BatchEvent::GroupFailed {
            run_id: self.run_id.clone(),
            group_id: group_id.to_string(),
            reason: err.to_string(),
        });
        self.groups.push(report);
    }

    pub fn group_cancelled(&mut self, group_id: &str) {
        self.close_dangling();
        self.stats.cancelled_groups += 1;
        tracing::info!(group = group_id, "group cancelled before start");
        self.emit(BatchEvent::GroupCancelled {
            run_id: self.run_id.clone(),
            group_id: group_id.to_string(),
        });
        self.groups
            .push(GroupReport::new(group_id, GroupState::Cancelled));
    }

    pub fn finalize(mut self) -> BatchSummary {
        self.close_dangling();
        self.stats.finished_at = Some(Local::now());
        let duration_ms = self
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);

        tracing::info!(
            run_id = %self.run_id,
            pipeline = %self.pipeline,
            discovered = self.stats.discovered,
            already_done = self.stats.already_done,
            submitted = self.stats.submitted,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            failed_groups = self.stats.failed_groups,
            duration_ms,
            "batch finished"
        );
        self.emit(BatchEvent::BatchEnd {
            run_id: self.run_id.clone(),
            pipeline: self.pipeline.clone(),
            stats: self.stats.clone(),
            duration_ms,
        });

        BatchSummary {
            run_id: self.run_id,
            pipeline: self.pipeline,
            stats: self.stats,
            groups: self.groups,
            duration_ms,
        }
    }

    fn fail_item(&mut self, group_id: &str, input: &std::path::Path, err: &ItemError) {
        self.stats.failed += 1;
        let record = FailureRecord {
            input: input.to_path_buf(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        };
        if let Some(open) = self.current.as_mut() {
            open.report.failed += 1;
            open.report.failures.push(record.clone());
        }
        tracing::error!(
            group = group_id,
            input = %input.display(),
            kind = err.kind(),
            reason = %err,
            "item failed"
        );
        self.emit(BatchEvent::ItemFailed {
            run_id: self.run_id.clone(),
            group_id: group_id.to_string(),
            input: record.input,
            kind: record.kind,
            reason: record.reason,
        });
    }

    // A group that was started but never finished still ends up in the
    // summary, in whatever state it reached.
    fn close_dangling(&mut self) {
        if let Some(open) = self.current.take() {
            let mut report = open.report;
            report.duration_ms = open.started.elapsed().as_millis() as u64;
            tracing::warn!(group = %report.group_id, state = ?report.state, "group left open");
            self.groups.push(report);
        }
    }

    fn emit(&self, event: BatchEvent) {
        for sink in &self.sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.emit(&event))).is_err() {
                tracing::warn!(sink = sink.name(), event = event.event_type(), "event sink panicked");
            }
        }
    }
}
