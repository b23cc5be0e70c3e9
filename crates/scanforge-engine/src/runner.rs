//! The per-task output-reading loop.
//!
//! One `drive` invocation runs per live scanner process, spawned by the
//! scheduler at task creation. After registration it is the sole writer of
//! its task's state, findings and counters; the scheduler and presentation
//! layer only take snapshots. No task's failure or slowness blocks another
//! task.

use crate::accumulator;
use crate::events::TaskEvent;
use crate::process::ScanProcess;
use crate::scheduler::SharedTasks;
use scanforge_core::{ScanTask, TaskId};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the read loop needs, captured at task creation so later
/// settings changes never affect a submitted task.
pub(crate) struct RunSpec {
    pub task_id: TaskId,
    pub binary: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub grace: Duration,
    pub cancel: CancellationToken,
}

pub(crate) async fn drive(
    tasks: SharedTasks,
    events: broadcast::Sender<TaskEvent>,
    spec: RunSpec,
) {
    // A stop that lands before the spawn goes straight to Stopped without
    // ever creating a process.
    if spec.cancel.is_cancelled() {
        transition(&tasks, &events, &spec.task_id, ScanTask::stop).await;
        return;
    }

    let mut proc = match ScanProcess::spawn(&spec.binary, &spec.args, spec.working_dir.as_deref())
    {
        Ok(proc) => proc,
        Err(e) => {
            warn!(task_id = %spec.task_id, error = %e, "scanner failed to spawn");
            let detail = e.to_string();
            transition(&tasks, &events, &spec.task_id, move |t| t.fail(detail)).await;
            return;
        }
    };

    info!(task_id = %spec.task_id, pid = ?proc.id(), "scanner spawned");
    transition(&tasks, &events, &spec.task_id, ScanTask::mark_running).await;

    loop {
        tokio::select! {
            _ = spec.cancel.cancelled() => {
                if let Err(e) = proc.terminate(spec.grace).await {
                    warn!(task_id = %spec.task_id, error = %e, "terminating scanner failed");
                }
                info!(task_id = %spec.task_id, "scan stopped on request");
                transition(&tasks, &events, &spec.task_id, ScanTask::stop).await;
                return;
            }
            line = proc.next_line() => match line {
                Ok(Some(line)) => {
                    let mut table = tasks.write().await;
                    if let Some(entry) = table.entry_mut(&spec.task_id) {
                        accumulator::feed(&mut entry.task, &line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(task_id = %spec.task_id, error = %e, "error reading scanner output");
                    break;
                }
            }
        }
    }

    // End of stream: classify the exit.
    match proc.wait().await {
        Ok(status) if status.success() => {
            info!(task_id = %spec.task_id, "scan completed");
            transition(&tasks, &events, &spec.task_id, ScanTask::complete).await;
        }
        Ok(status) => {
            let detail = match proc.stderr_tail().await {
                Some(tail) => tail,
                None => match status.code() {
                    Some(code) => format!("scanner exited with code {}", code),
                    None => "scanner terminated by signal".to_string(),
                },
            };
            warn!(task_id = %spec.task_id, code = ?status.code(), "scan failed");
            transition(&tasks, &events, &spec.task_id, move |t| t.fail(detail)).await;
        }
        Err(e) => {
            let detail = format!("failed to reap scanner: {}", e);
            warn!(task_id = %spec.task_id, error = %e, "scan failed");
            transition(&tasks, &events, &spec.task_id, move |t| t.fail(detail)).await;
        }
    }
}

/// Apply a state transition under a short write-lock window and broadcast
/// the resulting state.
async fn transition(
    tasks: &SharedTasks,
    events: &broadcast::Sender<TaskEvent>,
    task_id: &TaskId,
    apply: impl FnOnce(&mut ScanTask),
) {
    let event = {
        let mut table = tasks.write().await;
        let Some(entry) = table.entry_mut(task_id) else {
            return;
        };
        apply(&mut entry.task);
        TaskEvent {
            task_id: task_id.clone(),
            state: entry.task.state,
            error: entry.task.last_error.clone(),
        }
    };
    // No receivers is fine; polling is the primary interface.
    let _ = events.send(event);
}
