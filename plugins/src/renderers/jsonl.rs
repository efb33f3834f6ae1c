use imgbatch_core::api::{BatchEvent, EventSink};

/// One JSON object per event on stdout, same shape as the events-out file.
pub struct JsonlRenderer {
    pretty_print: bool,
}

impl JsonlRenderer {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn render_line(&self, event: &BatchEvent) -> Option<String> {
        let value = event.to_json();
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        line.ok()
    }
}

impl EventSink for JsonlRenderer {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn emit(&self, event: &BatchEvent) {
        if let Some(line) = self.render_line(event) {
            println!("{line}");
        }
    }
}
