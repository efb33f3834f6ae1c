use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    /// Pipelines run in declaration order (e.g. `convert` before `register`).
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl AppConfig {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for p in &self.pipelines {
            if !seen.insert(p.name.as_str()) {
                return Err(format!("duplicate pipeline name '{}'", p.name));
            }
            p.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "imgbatch_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses the data dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,
    /// File path, or `stdout:`.
    #[serde(default = "default_events_path")]
    pub path: String,
    #[serde(default = "default_events_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_drop_when_full")]
    pub drop_when_full: bool,
}

fn default_events_path() -> String {
    "./imgbatch.events.jsonl".to_string()
}

fn default_events_capacity() -> usize {
    2048
}

fn default_drop_when_full() -> bool {
    true
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_path(),
            channel_capacity: default_events_capacity(),
            drop_when_full: default_drop_when_full(),
        }
    }
}

/// Which directory entries count as work items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Any,
    Files,
    Dirs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Appended to the (possibly stripped) input basename.
    #[serde(default)]
    pub suffix: String,
    /// Drop everything after the first `.` of the input name before appending
    /// the suffix, so `t1.nii` + `.nii.gz` gives `t1.nii.gz`.
    #[serde(default)]
    pub strip_extension: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub input_root: String,
    pub output_root: String,

    /// 1: `root/<group>/<item>`, 2: `root/<subject>/<group>/<item>`.
    #[serde(default = "default_group_depth")]
    pub group_depth: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-item deadline. Unset means a stage may run indefinitely.
    #[serde(default)]
    pub item_timeout_secs: Option<u64>,

    #[serde(default)]
    pub entries: EntryKind,

    /// Glob matched against the entry name, e.g. `*.nii`.
    #[serde(default)]
    pub include: Option<String>,

    #[serde(default)]
    pub include_hidden: bool,

    #[serde(default)]
    pub naming: NamingConfig,

    /// Named read-only resources handed to every stage call (name -> path).
    #[serde(default)]
    pub reference: BTreeMap<String, String>,

    /// Reference files at least this large are memory-mapped.
    #[serde(default = "default_mmap_threshold_mb")]
    pub reference_mmap_threshold_mb: u64,

    #[serde(default)]
    pub stage: StageConfig,
}

fn default_group_depth() -> usize {
    1
}

fn default_max_workers() -> usize {
    num_cpus::get().max(1)
}

fn default_mmap_threshold_mb() -> u64 {
    10
}

impl PipelineConfig {
    pub fn new(name: &str, input_root: &str, output_root: &str) -> Self {
        Self {
            name: name.to_string(),
            input_root: input_root.to_string(),
            output_root: output_root.to_string(),
            group_depth: default_group_depth(),
            max_workers: default_max_workers(),
            item_timeout_secs: None,
            entries: EntryKind::default(),
            include: None,
            include_hidden: false,
            naming: NamingConfig::default(),
            reference: BTreeMap::new(),
            reference_mmap_threshold_mb: default_mmap_threshold_mb(),
            stage: StageConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("pipeline name must not be empty".to_string());
        }
        if self.max_workers == 0 {
            return Err(format!("pipeline '{}': max_workers must be >= 1", self.name));
        }
        if !(1..=2).contains(&self.group_depth) {
            return Err(format!(
                "pipeline '{}': group_depth must be 1 or 2, got {}",
                self.name, self.group_depth
            ));
        }
        if let Some(pattern) = &self.include {
            glob::Pattern::new(pattern)
                .map_err(|e| format!("pipeline '{}': bad include glob: {e}", self.name))?;
        }
        if self.naming.suffix.contains(['/', '\\']) {
            return Err(format!(
                "pipeline '{}': naming.suffix must not contain path separators",
                self.name
            ));
        }
        if let StageConfig::Command(cmd) = &self.stage {
            if cmd.program.trim().is_empty() {
                return Err(format!("pipeline '{}': stage.program is empty", self.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StageConfig {
    Command(CommandStageConfig),
    #[default]
    Copy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStageConfig {
    pub program: String,

    /// Supports `{input}`, `{output}`, `{name}` and `{ref:<name>}`.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// How much of the child's stderr is kept for the failure record.
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
}

fn default_stderr_tail_bytes() -> usize {
    2048
}
