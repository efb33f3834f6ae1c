//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `imgbatch_core::api` instead of reaching into internal modules.

pub use crate::accountant::{
    BatchEvent, BatchSummary, EventSink, FailureRecord, GroupReport, RunAccountant, RunStats,
};
pub use crate::config::{
    expand_path, get_imgbatch_data_dir, load, load_default, parse_config, AppConfig,
    CommandStageConfig, EntryKind, EventsOutConfig, LoggingConfig, NamingConfig, PipelineConfig,
    StageConfig,
};
pub use crate::driver::{plan, BatchDriver, CancelFlag, GroupPlan, GroupState, Pipeline};
pub use crate::error::{BatchError, CliError, EnumerationError, ItemError, StageError};
pub use crate::events_out::{start_events_out, EventsOut, EventsOutTx};
pub use crate::progress::ProgressMonitor;
pub use crate::reference::{ReferenceResource, SharedReference};
pub use crate::scheduler::{JobOutcome, JobStatus, PoolOptions, WorkerPool};
pub use crate::stage::TransformStage;
pub use crate::types::{GroupSpec, WorkItem};
pub use crate::walker::{Collision, EntryFilter, OutputNaming, Residual};
