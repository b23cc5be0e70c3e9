//! Task registry and scheduler.
//!
//! The scheduler owns the task collection outright - an explicit map behind
//! a lock, mutated only through scheduler methods and each task's own read
//! loop. It never touches a process handle directly; cancellation goes
//! through the owning task's token.

use crate::command::build_scan_args;
use crate::error::EngineError;
use crate::events::TaskEvent;
use crate::runner::{self, RunSpec};
use crate::settings::Settings;
use crate::templates::TemplateStore;
use scanforge_core::{Finding, ScanOptions, ScanTask, TaskId, TaskSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Extra wait beyond the termination grace period before `stop` gives up on
/// confirmation.
const STOP_CONFIRM_MARGIN: Duration = Duration::from_secs(2);

/// Broadcast capacity for task events; a lagging receiver misses events but
/// snapshots stay authoritative.
const EVENT_CAPACITY: usize = 64;

/// One registered task plus its cancellation handle.
pub(crate) struct TaskEntry {
    pub task: ScanTask,
    pub cancel: CancellationToken,
}

/// Registry storage: task entries plus insertion order for `list`.
#[derive(Default)]
pub(crate) struct TaskTable {
    entries: HashMap<TaskId, TaskEntry>,
    order: Vec<TaskId>,
}

impl TaskTable {
    pub(crate) fn entry_mut(&mut self, id: &TaskId) -> Option<&mut TaskEntry> {
        self.entries.get_mut(id)
    }
}

pub(crate) type SharedTasks = Arc<RwLock<TaskTable>>;

/// Schedules scan tasks and tracks their lifecycle.
///
/// Tasks run concurrently with no implicit upper bound; bounding parallelism
/// is the caller's concern.
pub struct Scheduler {
    settings: Settings,
    templates: Arc<dyn TemplateStore>,
    tasks: SharedTasks,
    events: broadcast::Sender<TaskEvent>,
}

impl Scheduler {
    /// Create a scheduler over a settings snapshot and a template store.
    pub fn new(settings: Settings, templates: Arc<dyn TemplateStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            settings,
            templates,
            tasks: Arc::new(RwLock::new(TaskTable::default())),
            events,
        }
    }

    /// Validate, register and immediately submit a new scan task.
    ///
    /// Validation and template resolution happen before anything is
    /// registered: on error no task exists and no process was spawned. The
    /// scanner command line is built against the settings snapshot captured
    /// at creation time.
    pub async fn create_task(
        &self,
        name: impl Into<String>,
        targets: Vec<String>,
        templates: Vec<String>,
        options: ScanOptions,
    ) -> Result<TaskId, EngineError> {
        let task = ScanTask::new(name, targets, templates, options)?;

        let template_paths = task
            .templates
            .iter()
            .map(|id| self.templates.resolve(id))
            .collect::<Result<Vec<_>, _>>()?;

        let args = build_scan_args(&self.settings, &task.targets, &template_paths, &task.options);

        let task_id = task.id.clone();
        let cancel = CancellationToken::new();
        let spec = RunSpec {
            task_id: task_id.clone(),
            binary: self.settings.binary.clone(),
            args,
            working_dir: self.settings.working_dir.clone(),
            grace: self.settings.grace_period(),
            cancel: cancel.clone(),
        };

        info!(
            task_id = %task_id,
            name = %task.name,
            targets = task.targets.len(),
            templates = task.templates.len(),
            "registering scan task"
        );

        {
            let mut table = self.tasks.write().await;
            table.order.push(task_id.clone());
            table.entries.insert(task_id.clone(), TaskEntry { task, cancel });
        }

        tokio::spawn(runner::drive(
            self.tasks.clone(),
            self.events.clone(),
            spec,
        ));

        Ok(task_id)
    }

    /// Snapshot one task's progress.
    pub async fn get(&self, task_id: &TaskId) -> Result<TaskSnapshot, EngineError> {
        let table = self.tasks.read().await;
        table
            .entries
            .get(task_id)
            .map(|entry| entry.task.snapshot())
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))
    }

    /// Copy of the findings a task has accumulated so far.
    pub async fn findings(&self, task_id: &TaskId) -> Result<Vec<Finding>, EngineError> {
        let table = self.tasks.read().await;
        table
            .entries
            .get(task_id)
            .map(|entry| entry.task.findings.clone())
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))
    }

    /// Snapshots of all tasks in insertion order.
    pub async fn list(&self) -> Vec<TaskSnapshot> {
        let table = self.tasks.read().await;
        table
            .order
            .iter()
            .filter_map(|id| table.entries.get(id))
            .map(|entry| entry.task.snapshot())
            .collect()
    }

    /// Number of registered tasks.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.entries.len()
    }

    /// Request cancellation of a task and wait (bounded) for the terminal
    /// state to be confirmed.
    ///
    /// Idempotent: stopping an already-terminal task is a no-op. If the
    /// process outlives the grace period the read loop force-kills it; this
    /// method waits at most grace + a small margin.
    pub async fn stop(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let cancel = {
            let table = self.tasks.read().await;
            let entry = table
                .entries
                .get(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?;
            if entry.task.is_terminal() {
                return Ok(());
            }
            entry.cancel.clone()
        };

        info!(task_id = %task_id, "stop requested");
        cancel.cancel();

        let deadline = self.settings.grace_period() + STOP_CONFIRM_MARGIN;
        let confirmed = tokio::time::timeout(deadline, async {
            loop {
                {
                    let table = self.tasks.read().await;
                    match table.entries.get(task_id) {
                        Some(entry) if entry.task.is_terminal() => break,
                        Some(_) => {}
                        None => break,
                    }
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await;

        if confirmed.is_err() {
            warn!(task_id = %task_id, "stop confirmation timed out");
        }
        Ok(())
    }

    /// Remove a task's tracking record.
    ///
    /// Only valid once the task is terminal - a live process's record cannot
    /// be removed out from under it.
    pub async fn remove(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let mut table = self.tasks.write().await;
        let entry = table
            .entries
            .get(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?;
        if !entry.task.is_terminal() {
            return Err(EngineError::InvalidState {
                task: task_id.clone(),
                state: entry.task.state,
            });
        }
        table.entries.remove(task_id);
        table.order.retain(|id| id != task_id);
        Ok(())
    }

    /// Drop all terminal tasks, returning how many were removed.
    pub async fn prune_finished(&self) -> usize {
        let mut table = self.tasks.write().await;
        let finished: Vec<TaskId> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.task.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &finished {
            table.entries.remove(id);
        }
        table.order.retain(|id| !finished.contains(id));
        finished.len()
    }

    /// Subscribe to task state-transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// The settings snapshot this scheduler was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
