use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::BatchError;
use crate::scheduler::PoolOptions;
use crate::walker::{EntryFilter, OutputNaming};

/// Everything the driver needs to run one configured pipeline, resolved
/// from [`PipelineConfig`]. Paths are taken as given; `parse_config` has
/// already expanded `~` and variables.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub group_depth: usize,
    pub filter: EntryFilter,
    pub naming: OutputNaming,
    pub pool: PoolOptions,
    pub reference: BTreeMap<String, String>,
    pub reference_mmap_threshold_mb: u64,
}

impl Pipeline {
    pub fn new(name: &str, input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            input_root: input_root.into(),
            output_root: output_root.into(),
            group_depth: 1,
            filter: EntryFilter::default(),
            naming: OutputNaming::identity(),
            pool: PoolOptions::new(num_cpus::get()),
            reference: BTreeMap::new(),
            reference_mmap_threshold_mb: 10,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, BatchError> {
        cfg.validate().map_err(BatchError::Config)?;
        let filter = EntryFilter::from_config(cfg).map_err(BatchError::Config)?;
        let pool = PoolOptions::new(cfg.max_workers)
            .with_timeout(cfg.item_timeout_secs.map(Duration::from_secs));
        Ok(Self {
            name: cfg.name.clone(),
            input_root: PathBuf::from(&cfg.input_root),
            output_root: PathBuf::from(&cfg.output_root),
            group_depth: cfg.group_depth,
            filter,
            naming: OutputNaming::from(&cfg.naming),
            pool,
            reference: cfg.reference.clone(),
            reference_mmap_threshold_mb: cfg.reference_mmap_threshold_mb,
        })
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.group_depth = depth;
        self
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_reference(mut self, name: &str, path: impl Into<String>) -> Self {
        self.reference.insert(name.to_string(), path.into());
        self
    }
}
