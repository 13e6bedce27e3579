//! Process spawning primitives
//!
//! Chain expressions and session commands are arbitrary shell strings, so
//! every spawn goes through the platform shell (`sh -c` / `cmd /C`). Graceful
//! shutdown is a terminate-wait-kill escalation; the terminate signal is sent
//! through the platform's own kill utility to stay free of unsafe code.

use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Build a command that runs `command` through the platform shell.
pub(crate) fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Send a graceful termination signal to `pid` (SIGTERM on Unix).
fn send_term_signal(pid: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let status = std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()?;
        if !status.success() {
            return Err(std::io::Error::other("kill -TERM failed"));
        }
        Ok(())
    }
    #[cfg(windows)]
    {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .status()?;
        if !status.success() {
            return Err(std::io::Error::other("taskkill failed"));
        }
        Ok(())
    }
}

/// Terminate `child` gracefully, escalating to a force-kill after `grace`.
///
/// Safe to call on an already-exited child; the escalation is skipped as soon
/// as the process is observed dead.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    match child.id() {
        Some(pid) => {
            if let Err(e) = send_term_signal(pid) {
                debug!(pid, error = %e, "terminate signal failed, force-killing");
                let _ = child.start_kill();
            }
        }
        // No pid means the child was already reaped
        None => return,
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    warn!(pid = child.id(), "process survived terminate, force-killing");
    let _ = child.kill().await;
}
