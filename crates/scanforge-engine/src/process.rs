//! Scanner subprocess lifecycle.
//!
//! A [`ScanProcess`] owns one live scanner invocation: the OS child process
//! plus its output-stream cursor. It is owned by exactly one task, never
//! shared, and its resources are released exactly once - on natural exit,
//! error exit or explicit termination.

use crate::error::EngineError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines of stderr retained as the error detail on nonzero exit.
const STDERR_TAIL_LINES: usize = 20;

/// A spawned scanner process with incremental access to its output.
#[derive(Debug)]
pub struct ScanProcess {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    stderr_cache: Option<String>,
    exit: Option<ExitStatus>,
}

impl ScanProcess {
    /// Spawn the scanner executable with the given argument list.
    ///
    /// Fails with [`EngineError::Spawn`] when the executable is missing, not
    /// executable, or the OS refuses to create the process.
    pub fn spawn(
        binary: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<Self, EngineError> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child must not outlive its handle.
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("scanner stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("scanner stderr not captured"))?;

        // Drain stderr in the background; keep a bounded tail for error
        // reporting and log everything else as it arrives.
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                warn!(stderr = %trimmed, "scanner stderr");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(trimmed.to_string());
            }
            tail.join("\n")
        });

        Ok(Self {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr_task: Some(stderr_task),
            stderr_cache: None,
            exit: None,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Read the next complete output line.
    ///
    /// Blocks the calling read loop (and only it) until a line is available;
    /// `Ok(None)` is the end-of-stream marker once the process closes its
    /// stdout.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.stdout.next_line().await
    }

    /// Wait for the process to exit and reap it.
    ///
    /// The exit status is cached, so the child is released exactly once no
    /// matter how often this is called.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Request process termination.
    ///
    /// Signals the process, waits up to `grace`, then force-kills if it is
    /// still alive. Idempotent: calling this on an already-terminated handle
    /// is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> std::io::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }

        match self.child.id() {
            Some(pid) => signal_term(pid, &mut self.child),
            None => {
                // Already exited; just reap.
                self.wait().await?;
                return Ok(());
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                self.exit = Some(status?);
            }
            Err(_) => {
                debug!("scanner ignored termination signal; force-killing");
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                self.exit = Some(status);
            }
        }
        Ok(())
    }

    /// Tail of the scanner's stderr, available once the process has exited.
    pub async fn stderr_tail(&mut self) -> Option<String> {
        if let Some(handle) = self.stderr_task.take() {
            // The drain task ends at stderr EOF; the timeout only guards a
            // wedged pipe.
            match tokio::time::timeout(Duration::from_millis(500), handle).await {
                Ok(Ok(tail)) if !tail.is_empty() => self.stderr_cache = Some(tail),
                Ok(_) => {}
                Err(_) => debug!("timed out collecting scanner stderr"),
            }
        }
        self.stderr_cache.clone()
    }
}

#[cfg(unix)]
fn signal_term(pid: u32, _child: &mut Child) {
    // SAFETY: pid belongs to a child we own and have not reaped yet. A
    // failure means the process is already gone; the follow-up wait reaps it.
    let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, "SIGTERM delivery failed; process likely already exited");
    }
}

#[cfg(not(unix))]
fn signal_term(_pid: u32, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill request failed; process likely already exited");
    }
}
