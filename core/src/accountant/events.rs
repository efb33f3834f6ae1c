use std::path::PathBuf;

use chrono::Local;
use serde_json::{json, Value};

use super::stats::{GroupReport, RunStats};

/// Lifecycle events emitted by the accountant, in emission order:
/// `BatchStart`, then per group `GroupStart`, item events and `GroupEnd` (or a
/// single `GroupFailed` / `GroupCancelled`), then `BatchEnd`.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStart {
        run_id: String,
        pipeline: String,
        groups: usize,
    },
    GroupStart {
        run_id: String,
        group_id: String,
        discovered: usize,
        already_done: usize,
        to_do: usize,
    },
    ItemSucceeded {
        run_id: String,
        group_id: String,
        input: PathBuf,
        output: PathBuf,
        duration_ms: u64,
    },
    ItemFailed {
        run_id: String,
        group_id: String,
        input: PathBuf,
        kind: String,
        reason: String,
    },
    GroupEnd {
        run_id: String,
        report: GroupReport,
    },
    GroupFailed {
        run_id: String,
        group_id: String,
        reason: String,
    },
    GroupCancelled {
        run_id: String,
        group_id: String,
    },
    BatchEnd {
        run_id: String,
        pipeline: String,
        stats: RunStats,
        duration_ms: u64,
    },
}

impl BatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BatchStart { .. } => "batch.start",
            Self::GroupStart { .. } => "group.start",
            Self::ItemSucceeded { .. } => "item.success",
            Self::ItemFailed { .. } => "item.failure",
            Self::GroupEnd { .. } => "group.end",
            Self::GroupFailed { .. } => "group.failed",
            Self::GroupCancelled { .. } => "group.cancelled",
            Self::BatchEnd { .. } => "batch.end",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::BatchStart { run_id, .. }
            | Self::GroupStart { run_id, .. }
            | Self::ItemSucceeded { run_id, .. }
            | Self::ItemFailed { run_id, .. }
            | Self::GroupEnd { run_id, .. }
            | Self::GroupFailed { run_id, .. }
            | Self::GroupCancelled { run_id, .. }
            | Self::BatchEnd { run_id, .. } => run_id,
        }
    }

    /// One JSONL record: `{v, event_type, ts, run_id, group_id?, metadata}`.
    pub fn to_json(&self) -> Value {
        let ts = Local::now().to_rfc3339();
        let (group_id, metadata) = match self {
            Self::BatchStart {
                pipeline, groups, ..
            } => (
                None,
                json!({ "pipeline": pipeline, "groups": groups }),
            ),
            Self::GroupStart {
                group_id,
                discovered,
                already_done,
                to_do,
                ..
            } => (
                Some(group_id),
                json!({
                    "discovered": discovered,
                    "already_done": already_done,
                    "to_do": to_do,
                }),
            ),
            Self::ItemSucceeded {
                group_id,
                input,
                output,
                duration_ms,
                ..
            } => (
                Some(group_id),
                json!({
                    "input": input.display().to_string(),
                    "output": output.display().to_string(),
                    "duration_ms": duration_ms,
                }),
            ),
            Self::ItemFailed {
                group_id,
                input,
                kind,
                reason,
                ..
            } => (
                Some(group_id),
                json!({
                    "input": input.display().to_string(),
                    "kind": kind,
                    "reason": reason,
                }),
            ),
            Self::GroupEnd { report, .. } => (
                Some(&report.group_id),
                serde_json::to_value(report).unwrap_or(Value::Null),
            ),
            Self::GroupFailed {
                group_id, reason, ..
            } => (Some(group_id), json!({ "reason": reason })),
            Self::GroupCancelled { group_id, .. } => (Some(group_id), json!({})),
            Self::BatchEnd {
                pipeline,
                stats,
                duration_ms,
                ..
            } => (
                None,
                json!({
                    "pipeline": pipeline,
                    "stats": serde_json::to_value(stats).unwrap_or(Value::Null),
                    "duration_ms": duration_ms,
                }),
            ),
        };

        let mut obj = json!({
            "v": 1,
            "event_type": self.event_type(),
            "ts": ts,
            "run_id": self.run_id(),
            "metadata": metadata,
        });
        if let (Some(group_id), Some(map)) = (group_id, obj.as_object_mut()) {
            map.insert("group_id".to_string(), Value::String(group_id.clone()));
        }
        obj
    }
}

/// Receiver of accountant events (console renderer, JSONL file, progress
/// bars). Implementations must not block for long and must not fail the run:
/// any error is theirs to swallow.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    fn emit(&self, event: &BatchEvent);
}
