//! Resumable, fault-isolating batch engine for hierarchical imaging
//! datasets.
//!
//! A run walks `input_root/<group>/<item>`, computes for each group the
//! items whose derived output is still missing under `output_root`, and
//! runs those through a [`stage::TransformStage`] on a bounded worker pool.
//! Outputs appear only once complete, so re-running after any interruption
//! resumes where it stopped.

pub mod accountant;
pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod events_out;
pub mod progress;
pub mod reference;
pub mod scheduler;
pub mod stage;
pub mod types;
pub mod walker;
