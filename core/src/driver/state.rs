//! Per-group lifecycle and its legal transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Pending,
    Enumerating,
    Scheduling,
    Draining,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid group transition from {from:?} to {to:?}")]
    InvalidTransition { from: GroupState, to: GroupState },
    #[error("cannot leave terminal group state {state:?}")]
    FromTerminalState { state: GroupState },
}

impl GroupState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Check `self -> to` and return `to` when legal.
    pub fn transition(self, to: GroupState) -> Result<GroupState, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: self });
        }

        let is_valid = matches!(
            (self, to),
            (Self::Pending, Self::Enumerating)
                | (Self::Pending, Self::Cancelled)
                // missing input dir, or output dir cannot be created
                | (Self::Enumerating, Self::Failed)
                | (Self::Enumerating, Self::Scheduling)
                | (Self::Scheduling, Self::Draining)
                | (Self::Draining, Self::Done)
        );

        if is_valid {
            Ok(to)
        } else {
            Err(TransitionError::InvalidTransition { from: self, to })
        }
    }

    /// Next state on the success path.
    pub fn next(self) -> Option<GroupState> {
        match self {
            Self::Pending => Some(Self::Enumerating),
            Self::Enumerating => Some(Self::Scheduling),
            Self::Scheduling => Some(Self::Draining),
            Self::Draining => Some(Self::Done),
            Self::Done | Self::Failed | Self::Cancelled => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Pending => "waiting for earlier groups",
            Self::Enumerating => "listing input and output",
            Self::Scheduling => "submitting items",
            Self::Draining => "waiting for items",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}
