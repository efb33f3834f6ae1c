use imgbatch_core::api::{BatchEvent, EventSink};

/// Human-readable lifecycle lines on stdout.
pub struct TextRenderer {
    ascii_only: bool,
    /// Per-item success lines are noisy on large datasets.
    show_successes: bool,
}

impl TextRenderer {
    pub fn new(ascii_only: bool) -> Self {
        Self {
            ascii_only,
            show_successes: false,
        }
    }

    pub fn with_successes(mut self, yes: bool) -> Self {
        self.show_successes = yes;
        self
    }

    fn format_event(&self, event: &BatchEvent) -> Option<String> {
        let (ok, fail) = if self.ascii_only {
            ("OK", "FAIL")
        } else {
            ("✓", "✗")
        };
        let line = match event {
            BatchEvent::BatchStart {
                run_id,
                pipeline,
                groups,
            } => format!("BATCH START {pipeline} ({groups} groups, run {run_id})"),
            BatchEvent::GroupStart {
                group_id,
                already_done,
                to_do,
                ..
            } => format!("GROUP {group_id}: {already_done} already done, {to_do} to do"),
            BatchEvent::ItemSucceeded {
                input, duration_ms, ..
            } => {
                if !self.show_successes {
                    return None;
                }
                format!("  {ok} {} ({duration_ms}ms)", input.display())
            }
            BatchEvent::ItemFailed {
                input,
                kind,
                reason,
                ..
            } => format!("  {fail} {} [{kind}] {reason}", input.display()),
            BatchEvent::GroupEnd { report, .. } => format!(
                "GROUP END {} (succeeded {}, failed {}, duration {}ms)",
                report.group_id, report.succeeded, report.failed, report.duration_ms
            ),
            BatchEvent::GroupFailed {
                group_id, reason, ..
            } => format!("GROUP FAILED {group_id}: {reason}"),
            BatchEvent::GroupCancelled { group_id, .. } => format!("GROUP CANCELLED {group_id}"),
            BatchEvent::BatchEnd {
                pipeline,
                stats,
                duration_ms,
                ..
            } => format!(
                "BATCH END {pipeline} (discovered {}, already done {}, succeeded {}, failed {}, failed groups {}, duration {}ms)",
                stats.discovered,
                stats.already_done,
                stats.succeeded,
                stats.failed,
                stats.failed_groups,
                duration_ms
            ),
        };
        Some(line)
    }
}

impl EventSink for TextRenderer {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn emit(&self, event: &BatchEvent) {
        if let Some(line) = self.format_event(event) {
            println!("{line}");
        }
    }
}
