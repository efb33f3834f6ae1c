//! Batch driver: walks groups in order, runs each through the worker pool
//! and hands every outcome to the accountant.
//!
//! Groups are strictly sequential; items within a group are parallel. A
//! group that cannot be enumerated is recorded and skipped. The only errors
//! that stop a run are those that make every group impossible: an
//! unreadable input root, an output root that cannot be created, or a
//! reference resource that cannot be loaded.

mod cancel;
mod pipeline;
mod state;

use std::sync::Arc;

pub use cancel::CancelFlag;
pub use pipeline::Pipeline;
pub use state::{GroupState, TransitionError};

use crate::accountant::{BatchSummary, RunAccountant};
use crate::error::{BatchError, EnumerationError};
use crate::reference::SharedReference;
use crate::scheduler;
use crate::stage::TransformStage;
use crate::types::GroupSpec;
use crate::walker::{self, Residual};

/// Read-only view of what a run would do for one group.
#[derive(Debug)]
pub struct GroupPlan {
    pub group_id: String,
    pub residual: Result<Residual, EnumerationError>,
}

pub struct BatchDriver<S: TransformStage> {
    stage: Arc<S>,
    cancel: CancelFlag,
}

impl<S: TransformStage> BatchDriver<S> {
    pub fn new(stage: S) -> Self {
        Self::from_arc(Arc::new(stage))
    }

    pub fn from_arc(stage: Arc<S>) -> Self {
        Self {
            stage,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run every group of `pipeline`, or only `groups` when given (ids
    /// relative to the input root, `/`-separated).
    #[tracing::instrument(name = "pipeline", skip_all, fields(pipeline = %pipeline.name))]
    pub async fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        groups: Option<&[String]>,
        mut accountant: RunAccountant,
    ) -> Result<BatchSummary, BatchError> {
        tracing::info!(
            pipeline = %pipeline.name,
            stage = self.stage.name(),
            input_root = %pipeline.input_root.display(),
            output_root = %pipeline.output_root.display(),
            max_workers = pipeline.pool.max_workers,
            "pipeline starting"
        );

        let reference = Arc::new(SharedReference::load(
            &pipeline.reference,
            pipeline.reference_mmap_threshold_mb,
        )?);

        std::fs::create_dir_all(&pipeline.output_root).map_err(|source| BatchError::OutputRoot {
            path: pipeline.output_root.clone(),
            source,
        })?;

        let (specs, unlisted) = resolve_groups(pipeline, groups)?;

        accountant.batch_started(specs.len() + unlisted.len());
        for (group_id, err) in &unlisted {
            accountant.group_failed(group_id, err);
        }

        for group in &specs {
            if self.cancel.is_cancelled() {
                GroupState::Pending.transition(GroupState::Cancelled)?;
                accountant.group_cancelled(&group.id);
                continue;
            }
            let state = self
                .run_group(pipeline, group, reference.clone(), &mut accountant)
                .await?;
            tracing::debug!(group = %group.id, state = state.description(), "group settled");
        }

        Ok(accountant.finalize())
    }

    #[tracing::instrument(name = "group", skip_all, fields(group = %group.id))]
    async fn run_group(
        &self,
        pipeline: &Pipeline,
        group: &GroupSpec,
        reference: Arc<SharedReference>,
        accountant: &mut RunAccountant,
    ) -> Result<GroupState, BatchError> {
        let state = GroupState::Pending.transition(GroupState::Enumerating)?;

        let residual = match walker::enumerate(group, &pipeline.filter, &pipeline.naming) {
            Ok(residual) => residual,
            Err(err) => {
                let state = state.transition(GroupState::Failed)?;
                accountant.group_failed(&group.id, &err);
                return Ok(state);
            }
        };

        accountant.group_started(
            &group.id,
            residual.discovered(),
            residual.already_done,
            residual.pending.len(),
        );
        for collision in &residual.collisions {
            accountant.record_collision(&group.id, collision);
        }

        let state = state.transition(GroupState::Scheduling)?;
        let submitted = residual.pending.len();

        // `run` submits every item before it starts draining.
        let state = state.transition(GroupState::Draining)?;
        let outcomes = scheduler::run(
            residual.pending,
            self.stage.clone(),
            reference,
            pipeline.pool,
            |outcome| accountant.record(outcome),
        )
        .await;
        if outcomes.len() != submitted {
            tracing::error!(
                group = %group.id,
                submitted,
                drained = outcomes.len(),
                "pool lost outcomes"
            );
        }

        let state = state.transition(GroupState::Done)?;
        accountant.group_finished(&group.id);
        Ok(state)
    }
}

/// Residual work per group without touching the output tree.
pub fn plan(pipeline: &Pipeline, groups: Option<&[String]>) -> Result<Vec<GroupPlan>, BatchError> {
    let (specs, unlisted) = resolve_groups(pipeline, groups)?;
    let mut plans: Vec<GroupPlan> = unlisted
        .into_iter()
        .map(|(group_id, err)| GroupPlan {
            group_id,
            residual: Err(err),
        })
        .collect();
    for group in specs {
        let residual = if group.input_dir.is_dir() {
            walker::scan(&group, &pipeline.filter, &pipeline.naming)
        } else {
            Err(EnumerationError::MissingInput(group.input_dir.clone()))
        };
        plans.push(GroupPlan {
            group_id: group.id,
            residual,
        });
    }
    Ok(plans)
}

type Unlisted = Vec<(String, EnumerationError)>;

fn resolve_groups(
    pipeline: &Pipeline,
    groups: Option<&[String]>,
) -> Result<(Vec<GroupSpec>, Unlisted), BatchError> {
    if let Some(ids) = groups {
        let mut specs = Vec::new();
        let mut rejected = Vec::new();
        for id in ids {
            if GroupSpec::is_valid_id(id) {
                specs.push(GroupSpec::under(id, &pipeline.input_root, &pipeline.output_root));
            } else {
                tracing::warn!(group = %id, "rejecting group id outside the dataset roots");
                rejected.push((id.clone(), EnumerationError::InvalidGroupId(id.clone())));
            }
        }
        return Ok((specs, rejected));
    }

    let discovery = walker::discover_groups(
        &pipeline.input_root,
        &pipeline.output_root,
        pipeline.group_depth,
    )
    .map_err(|source| BatchError::InputRoot {
        path: pipeline.input_root.clone(),
        source,
    })?;
    Ok((discovery.groups, discovery.failures))
}
