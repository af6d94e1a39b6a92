//! Remote task state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a Task as reported by the batch service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task is queued but not yet scheduled on a node.
    #[default]
    Active,
    /// Task is assigned to a node and its preparation is running.
    Preparing,
    /// Task command line is executing on a node.
    Running,
    /// Task finished, successfully or not; see the exit code.
    Completed,
}

impl TaskState {
    /// Returns true if the task will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true once a node has picked up the task.
    pub fn is_scheduled(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}
