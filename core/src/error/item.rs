use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by a transformation stage, either from `transform` or from
/// `persist`.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Failed(String),
}

/// Item-level failure. Every variant is contained at the job boundary and
/// recorded against the single item that produced it.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("transform failed: {0}")]
    Transform(StageError),

    #[error("write failed: {0}")]
    Write(StageError),

    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("output name '{output_name}' is also claimed by {other}")]
    Collision { output_name: String, other: PathBuf },
}

impl ItemError {
    /// Stable short label used in log records and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::Write(_) => "write",
            Self::WorkerCrashed(_) => "crashed",
            Self::TimedOut(_) => "timeout",
            Self::Collision { .. } => "collision",
        }
    }
}
