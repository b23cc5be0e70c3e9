//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Scanforge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task creation requires at least one non-blank target.
    #[error("Task requires at least one target")]
    EmptyTargets,

    /// Task creation requires at least one template.
    #[error("Task requires at least one template")]
    EmptyTemplates,

    /// An advanced option failed validation.
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}
