//! Scan task record and lifecycle transitions.

use crate::error::CoreError;
use crate::ids::TaskId;
use crate::options::ScanOptions;
use crate::record::Finding;
use crate::status::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tracked invocation of the external scanner against a target/template
/// set.
///
/// The target list and template set are fixed at construction; once the
/// process has started they are never mutated. After registration the task's
/// output-reading loop is the sole writer of state, findings and counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTask {
    /// Unique task identifier.
    pub id: TaskId,

    /// Human-readable label for the task.
    pub name: String,

    /// Targets to scan (trimmed, deduplicated, non-empty).
    pub targets: Vec<String>,

    /// Template identifiers selected for this task.
    pub templates: Vec<String>,

    /// Advanced options captured at creation time.
    pub options: ScanOptions,

    /// Current lifecycle state.
    pub state: TaskState,

    /// When the task was registered.
    pub created_at: DateTime<Utc>,

    /// When the scanner process spawned.
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,

    /// Findings accumulated so far, in arrival order.
    pub findings: Vec<Finding>,

    /// Output lines consumed from the scanner.
    pub lines_processed: u64,

    /// Lines that failed to parse as result records.
    pub malformed_lines: u64,

    /// Error detail for failed tasks.
    pub last_error: Option<String>,
}

impl ScanTask {
    /// Create a new `Pending` task, validating targets, templates and
    /// options. Fails with [`CoreError`] before any side effect.
    pub fn new(
        name: impl Into<String>,
        targets: Vec<String>,
        templates: Vec<String>,
        options: ScanOptions,
    ) -> Result<Self, CoreError> {
        let targets = dedup_non_blank(targets);
        if targets.is_empty() {
            return Err(CoreError::EmptyTargets);
        }

        let templates = dedup_non_blank(templates);
        if templates.is_empty() {
            return Err(CoreError::EmptyTemplates);
        }

        options.validate()?;

        Ok(Self {
            id: TaskId::generate(),
            name: name.into(),
            targets,
            templates,
            options,
            state: TaskState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            findings: Vec::new(),
            lines_processed: 0,
            malformed_lines: 0,
            last_error: None,
        })
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Mark the task as running. Only effective from `Pending`.
    pub fn mark_running(&mut self) {
        if self.state == TaskState::Pending {
            self.state = TaskState::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Mark the task as completed. Terminal states are never overwritten.
    pub fn complete(&mut self) {
        if self.state.is_active() {
            self.state = TaskState::Completed;
            self.finished_at = Some(Utc::now());
        }
    }

    /// Mark the task as failed with an error detail. Findings accumulated
    /// before the failure remain visible.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.state.is_active() {
            self.state = TaskState::Failed;
            self.finished_at = Some(Utc::now());
            self.last_error = Some(error.into());
        }
    }

    /// Mark the task as stopped after a honored cancellation.
    pub fn stop(&mut self) {
        if self.state.is_active() {
            self.state = TaskState::Stopped;
            self.finished_at = Some(Utc::now());
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Take a read-only snapshot of the task's progress.
    ///
    /// Callable from any state; never blocks. Elapsed time runs from process
    /// start until the terminal timestamp, or until now while running.
    pub fn snapshot(&self) -> TaskSnapshot {
        let elapsed_ms = self.started_at.map(|start| {
            let end = self.finished_at.unwrap_or_else(Utc::now);
            (end - start).num_milliseconds()
        });
        TaskSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            target_count: self.targets.len(),
            template_count: self.templates.len(),
            result_count: self.findings.len(),
            lines_processed: self.lines_processed,
            malformed_lines: self.malformed_lines,
            created_at: self.created_at,
            elapsed_ms,
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time view of a task's progress.
///
/// A plain copy: safe to hold across await points and cheap to serialize for
/// a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub target_count: usize,
    pub template_count: usize,
    pub result_count: usize,
    pub lines_processed: u64,
    pub malformed_lines: u64,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: Option<i64>,
    pub last_error: Option<String>,
}

/// Trim entries, drop blanks and deduplicate while preserving order.
fn dedup_non_blank(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
