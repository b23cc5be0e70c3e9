//! Task lifecycle events for in-process observers.

use scanforge_core::{TaskId, TaskState};
use serde::{Deserialize, Serialize};

/// Emitted on every task state transition.
///
/// Observers subscribe via [`crate::Scheduler::subscribe`]; snapshot polling
/// remains the authoritative view - a lagging receiver may miss events but
/// never corrupts task state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Task that transitioned.
    pub task_id: TaskId,

    /// State entered.
    pub state: TaskState,

    /// Error detail when entering `Failed`.
    pub error: Option<String>,
}
