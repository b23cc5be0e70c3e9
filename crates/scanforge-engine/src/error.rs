//! Engine error types.

use scanforge_core::{CoreError, TaskId, TaskState};
use thiserror::Error;

/// Errors surfaced by the execution engine and scheduler.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Task-creation input failed validation. No process was spawned and no
    /// task was registered.
    #[error("Validation failed: {0}")]
    Validation(#[from] CoreError),

    /// A selected template could not be resolved to a file.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// The task id is unknown to the registry.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The operation is not valid for the task's current state.
    #[error("Task {task} is {state}; operation requires a terminal state")]
    InvalidState { task: TaskId, state: TaskState },

    /// The scanner executable could not be started.
    #[error("Failed to spawn scanner '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be loaded or persisted.
    #[error("Settings error: {0}")]
    Config(String),
}
