//! Single-command and pipe execution

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::spawn;

/// Captured outcome of one command or one whole pipe chain.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// Collapse to the user-visible output string: stdout if non-empty,
    /// stderr otherwise, trimmed of surrounding whitespace.
    pub fn display_output(&self) -> String {
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            self.stderr.trim().to_string()
        } else {
            stdout.to_string()
        }
    }
}

fn drain(pipe: Option<ChildStdout>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn drain_err(pipe: Option<ChildStderr>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.await.unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Run one command through the shell with a hard timeout.
///
/// On timeout the child is killed before the error is returned, so no
/// orphaned process outlives the call.
pub(crate) async fn run_single(command: &str, timeout_secs: u64) -> Result<CommandOutput> {
    let mut child = spawn::shell_command(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Spawn(e.to_string()))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain_err(child.stderr.take());

    let status = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await
    {
        Ok(waited) => waited.map_err(|e| Error::Execution(e.to_string()))?,
        Err(_) => {
            debug!(command, timeout_secs, "command timed out, killing");
            let _ = child.kill().await;
            stdout.abort();
            stderr.abort();
            return Err(Error::Timeout(timeout_secs));
        }
    };

    Ok(CommandOutput {
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
        success: status.success(),
    })
}

/// Run a pipe chain: stage `i`'s stdout becomes stage `i+1`'s stdin.
///
/// The intermediate write ends are moved into the next child and closed in
/// the parent at spawn time. The whole chain shares one timeout; on expiry
/// every stage is killed. Success requires every stage to exit 0.
pub(crate) async fn run_pipe(stages: &[String], timeout_secs: u64) -> Result<CommandOutput> {
    if stages.is_empty() {
        return Err(Error::Execution("empty pipe expression".to_string()));
    }

    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    let mut prev_stdout: Option<ChildStdout> = None;

    for (i, stage) in stages.iter().enumerate() {
        let last = i == stages.len() - 1;
        let mut cmd = spawn::shell_command(stage);

        match prev_stdout.take() {
            Some(upstream) => {
                let stdin: std::process::Stdio = TryInto::try_into(upstream)
                    .map_err(|e: std::io::Error| Error::Spawn(e.to_string()))?;
                cmd.stdin(stdin);
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        cmd.stdout(Stdio::piped());
        // Only the last stage's stderr is user-visible output; intermediate
        // stderr is discarded so a full pipe cannot stall the chain.
        cmd.stderr(if last { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|e| {
            // A stage that failed to spawn leaves earlier stages running
            let msg = e.to_string();
            for earlier in &mut children {
                let _ = earlier.start_kill();
            }
            Error::Spawn(msg)
        })?;

        if !last {
            prev_stdout = child.stdout.take();
        }
        children.push(child);
    }

    // Readers must run while we wait, or a full stdout pipe would deadlock
    // the final stage.
    let last = children.last_mut().expect("pipe has at least one stage");
    let stdout = drain(last.stdout.take());
    let stderr = drain_err(last.stderr.take());

    let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        let mut all_ok = true;
        for child in &mut children {
            match child.wait().await {
                Ok(status) => all_ok &= status.success(),
                Err(e) => return Err(Error::Execution(e.to_string())),
            }
        }
        Ok(all_ok)
    })
    .await;

    let success = match waited {
        Ok(result) => result?,
        Err(_) => {
            debug!(stages = stages.len(), timeout_secs, "pipe timed out, killing stages");
            for child in &mut children {
                let _ = child.start_kill();
            }
            stdout.abort();
            stderr.abort();
            return Err(Error::Timeout(timeout_secs));
        }
    };

    Ok(CommandOutput {
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
        success,
    })
}
