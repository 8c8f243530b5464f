//! Lifecycle state of a pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a pipeline run is in its lifecycle.
///
/// `Idle -> Running -> {Succeeded, Failed, Cancelled}`. The three terminal
/// states are mutually exclusive and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not yet executed.
    #[default]
    Idle,
    /// Stages are in flight.
    Running,
    /// The sink stage produced a value.
    Succeeded,
    /// A stage failed or the run could not start.
    Failed,
    /// The deadline expired or the run was cancelled manually.
    Cancelled,
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
