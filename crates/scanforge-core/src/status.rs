//! Lifecycle states for scan tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a scan task.
///
/// Transitions: `Pending -> Running -> {Completed, Failed, Stopped}`.
/// The three right-hand states are terminal; a finished task is never
/// reused - a new scan always creates a new task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task registered but the scanner process has not spawned yet.
    #[default]
    Pending,
    /// Scanner process is alive and its output is being consumed.
    Running,
    /// Scanner exited with status 0.
    Completed,
    /// Scanner failed to spawn or exited with a nonzero status.
    Failed,
    /// A stop request was honored and the process was terminated.
    Stopped,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if the task is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}
