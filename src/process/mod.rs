//! Process Manager: registry of background (fire-and-forget) processes
//!
//! Every background process gets a dedicated monitor task that owns the
//! child handle, waits for exit, and writes the terminal status and captured
//! output back into the registry. Kills are requested through a channel so
//! the monitor is the only task that ever touches the handle.


use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_KILL_GRACE_SECS;
use crate::error::{Error, Result};
use crate::spawn;

/// Lifecycle status of a background process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Spawned and not yet exited
    Running,
    /// Exited with code 0
    Completed,
    /// Exited with a nonzero code
    Failed,
    /// Explicitly killed through the manager
    Killed,
    /// The monitor could not observe the exit
    Error,
}

impl ProcessStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Error => "error",
        }
    }

    /// Whether this status is terminal
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registry record for one background process.
///
/// This is a snapshot type: the live child handle is owned by the monitor
/// task, never stored here. Captured output is populated only once the
/// status is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundProcess {
    /// Registry identifier (`bg_<n>`), never reused
    pub id: String,
    /// The command the process was spawned from
    pub command: String,
    /// OS process id, if the child was observed alive
    pub pid: Option<u32>,
    /// Current lifecycle status
    pub status: ProcessStatus,
    /// Spawn time
    pub start_time: DateTime<Utc>,
    /// Time the terminal status was recorded
    pub end_time: Option<DateTime<Utc>>,
    /// Exit code, when the process exited on its own
    pub exit_code: Option<i32>,
    /// Captured stdout, populated at terminal status
    pub stdout: Option<String>,
    /// Captured stderr, populated at terminal status
    pub stderr: Option<String>,
}

/// Tracks processes spawned to run detached from the caller.
pub struct ProcessManager {
    entries: Arc<Mutex<HashMap<String, BackgroundProcess>>>,
    kill_channels: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
    counter: AtomicU64,
    kill_grace: Duration,
}

impl ProcessManager {
    /// Create a manager with the default kill grace period.
    #[must_use]
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_KILL_GRACE_SECS)
    }

    /// Create a manager with a custom terminate-to-kill grace period.
    #[must_use]
    pub fn with_grace(kill_grace_secs: u64) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            kill_channels: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicU64::new(0),
            kill_grace: Duration::from_secs(kill_grace_secs),
        }
    }

    /// Spawn `command` detached and register it, returning its identifier.
    ///
    /// The caller never waits: a dedicated monitor task records the terminal
    /// status and captured output when the process exits.
    pub fn start(&self, command: &str, id: Option<String>) -> Result<String> {
        let id = id.unwrap_or_else(|| {
            let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            format!("bg_{n}")
        });

        let mut child = spawn::shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn(e.to_string()))?;

        let pid = child.id();
        info!(id = %id, command, pid, "started background process");

        let entry = BackgroundProcess {
            id: id.clone(),
            command: command.to_string(),
            pid,
            status: ProcessStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            stdout: None,
            stderr: None,
        };
        self.lock_entries().insert(id.clone(), entry);

        let (kill_tx, kill_rx) = oneshot::channel();
        self.kill_channels
            .lock()
            .expect("kill channel lock poisoned")
            .insert(id.clone(), kill_tx);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::spawn(monitor(
            id.clone(),
            child,
            stdout,
            stderr,
            kill_rx,
            Arc::clone(&self.entries),
            Arc::clone(&self.kill_channels),
            self.kill_grace,
        ));

        Ok(id)
    }

    /// Look up the current record for `id`.
    pub fn status(&self, id: &str) -> Option<BackgroundProcess> {
        self.lock_entries().get(id).cloned()
    }

    /// Snapshot of every registered process.
    pub fn list(&self) -> Vec<BackgroundProcess> {
        self.lock_entries().values().cloned().collect()
    }

    /// Kill a running background process.
    ///
    /// Marks the entry `killed` and asks its monitor to terminate the child
    /// (graceful signal, bounded grace, then force-kill). Returns `false` for
    /// an unknown id; killing an already-terminal process is a no-op
    /// returning `true`.
    pub fn kill(&self, id: &str) -> bool {
        {
            let mut entries = self.lock_entries();
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if entry.status.is_terminal() {
                return true;
            }
            entry.status = ProcessStatus::Killed;
            entry.end_time = Some(Utc::now());
        }

        let sender = self
            .kill_channels
            .lock()
            .expect("kill channel lock poisoned")
            .remove(id);
        if let Some(tx) = sender {
            // A send failure means the monitor already finished; the entry
            // keeps the killed status either way.
            let _ = tx.send(());
        }
        info!(id, "killed background process");
        true
    }

    /// Remove terminal entries whose end time is older than `max_age`,
    /// returning how many were dropped. Running processes are never touched.
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            !(entry.status.is_terminal() && entry.end_time.is_some_and(|t| t < cutoff))
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, "pruned finished background processes");
        }
        dropped
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, BackgroundProcess>> {
        self.entries.lock().expect("process registry lock poisoned")
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Monitor task: owns the child, waits for exit or a kill request, then
/// writes the terminal record back into the registry.
#[allow(clippy::too_many_arguments)]
async fn monitor(
    id: String,
    mut child: Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    mut kill_rx: oneshot::Receiver<()>,
    entries: Arc<Mutex<HashMap<String, BackgroundProcess>>>,
    kill_channels: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
    kill_grace: Duration,
) {
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(id = %id, error = %e, "failed to observe background process exit");
                None
            }
        },
        _ = &mut kill_rx => {
            spawn::terminate(&mut child, kill_grace).await;
            let _ = child.wait().await;
            None
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if let Some(entry) = entries
        .lock()
        .expect("process registry lock poisoned")
        .get_mut(&id)
    {
        entry.stdout = Some(String::from_utf8_lossy(&stdout).to_string());
        entry.stderr = Some(String::from_utf8_lossy(&stderr).to_string());
        if entry.end_time.is_none() {
            entry.end_time = Some(Utc::now());
        }
        // A kill request already set the terminal status; only a natural
        // exit is classified here.
        if entry.status == ProcessStatus::Running {
            match exit {
                Some(status) => {
                    entry.exit_code = status.code();
                    entry.status = if status.success() {
                        ProcessStatus::Completed
                    } else {
                        ProcessStatus::Failed
                    };
                }
                None => entry.status = ProcessStatus::Error,
            }
        }
        debug!(id = %id, status = %entry.status, "background process finished");
    }

    kill_channels
        .lock()
        .expect("kill channel lock poisoned")
        .remove(&id);
}
