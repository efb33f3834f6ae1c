use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::accountant::{BatchEvent, EventSink};

/// Terminal progress: one bar for groups, one for the items of the current
/// group. Hidden when disabled (non-TTY or JSONL output).
pub struct ProgressMonitor {
    multi: MultiProgress,
    groups: ProgressBar,
    items: Mutex<Option<ProgressBar>>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                groups: ProgressBar::hidden(),
                items: Mutex::new(None),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let groups = multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} groups {msg}")
        {
            groups.set_style(style.progress_chars("█▓▒░  "));
        }

        Self {
            multi,
            groups,
            items: Mutex::new(None),
            enabled: true,
        }
    }

    fn start_items(&self, group_id: &str, to_do: usize) {
        let bar = self.multi.add(ProgressBar::new(to_do as u64));
        if let Ok(style) =
            ProgressStyle::default_bar().template("  {bar:30.green/white} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(group_id.to_string());
        if let Ok(mut slot) = self.items.lock() {
            if let Some(old) = slot.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_items(&self) {
        if let Ok(mut slot) = self.items.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        self.groups.inc(1);
    }

    fn tick_item(&self) {
        if let Ok(slot) = self.items.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(1);
            }
        }
    }
}

impl EventSink for ProgressMonitor {
    fn name(&self) -> &str {
        "progress"
    }

    fn emit(&self, event: &BatchEvent) {
        if !self.enabled {
            return;
        }
        match event {
            BatchEvent::BatchStart { groups, pipeline, .. } => {
                self.groups.set_length(*groups as u64);
                self.groups.set_message(pipeline.clone());
            }
            BatchEvent::GroupStart { group_id, to_do, .. } => self.start_items(group_id, *to_do),
            BatchEvent::ItemSucceeded { .. } => self.tick_item(),
            BatchEvent::ItemFailed { kind, .. } => {
                // collisions are reported before any item is scheduled
                if kind != "collision" {
                    self.tick_item();
                }
            }
            BatchEvent::GroupEnd { .. } => self.finish_items(),
            BatchEvent::GroupFailed { .. } | BatchEvent::GroupCancelled { .. } => {
                self.groups.inc(1)
            }
            BatchEvent::BatchEnd { stats, .. } => {
                let msg = if stats.failed == 0 && stats.failed_groups == 0 {
                    "✅ done".to_string()
                } else {
                    format!("❌ {} items, {} groups failed", stats.failed, stats.failed_groups)
                };
                self.groups.finish_with_message(msg);
            }
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.items.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accountant::RunStats;

    fn lifecycle(monitor: &ProgressMonitor) {
        monitor.emit(&BatchEvent::BatchStart {
            run_id: "r".into(),
            pipeline: "convert".into(),
            groups: 1,
        });
        monitor.emit(&BatchEvent::GroupStart {
            run_id: "r".into(),
            group_id: "g".into(),
            discovered: 2,
            already_done: 0,
            to_do: 2,
        });
        monitor.emit(&BatchEvent::ItemFailed {
            run_id: "r".into(),
            group_id: "g".into(),
            input: "a".into(),
            kind: "transform".into(),
            reason: "x".into(),
        });
        monitor.emit(&BatchEvent::BatchEnd {
            run_id: "r".into(),
            pipeline: "convert".into(),
            stats: RunStats::default(),
            duration_ms: 1,
        });
    }

    #[test]
    fn test_progress_monitor_disabled() {
        lifecycle(&ProgressMonitor::new(false));
    }

    #[test]
    fn test_progress_monitor_enabled() {
        lifecycle(&ProgressMonitor::new(true));
    }
}
