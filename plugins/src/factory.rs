use std::sync::Arc;

use anyhow::Result;
use imgbatch_core::api::{EventSink, EventsOutTx, PipelineConfig, ProgressMonitor, StageConfig};

use crate::renderers::{JsonlRenderer, TextRenderer};
use crate::stages::{CommandStage, ConfiguredStage, CopyStage};

pub fn build_stage(cfg: &PipelineConfig) -> ConfiguredStage {
    match &cfg.stage {
        StageConfig::Command(cmd) => ConfiguredStage::Command(CommandStage::from_config(cmd)),
        StageConfig::Copy => ConfiguredStage::Copy(CopyStage::new()),
    }
}

pub fn build_renderer(format: &str, ascii_only: bool) -> Result<Arc<dyn EventSink>> {
    match format {
        "text" => Ok(Arc::new(TextRenderer::new(ascii_only))),
        "jsonl" => Ok(Arc::new(JsonlRenderer::new(false))),
        other => Err(anyhow::anyhow!("unknown output format '{other}' (expected text|jsonl)")),
    }
}

/// Renderer for `format`, plus progress bars and the events-out file when
/// requested.
pub fn build_sinks(
    format: &str,
    ascii_only: bool,
    progress: bool,
    events_out: Option<EventsOutTx>,
) -> Result<Vec<Arc<dyn EventSink>>> {
    let mut sinks = vec![build_renderer(format, ascii_only)?];
    // progress bars would interleave with machine-readable stdout
    if progress && format == "text" {
        sinks.push(Arc::new(ProgressMonitor::new(true)));
    }
    if let Some(tx) = events_out {
        sinks.push(Arc::new(tx));
    }
    Ok(sinks)
}
