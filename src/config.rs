//! Timeout and polling configuration

use std::time::Duration;

/// Default hard timeout for a single command or a whole pipe chain, seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default budget for an interactive session to reach CONNECTED, seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle budget before the liveness monitor disconnects a session, seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Grace period between terminate and force-kill, seconds
pub const DEFAULT_KILL_GRACE_SECS: u64 = 1;

/// Interval between liveness checks, seconds
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 1;

/// Interval between output-queue polls, milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Configuration for the command chain executor
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Hard timeout applied to a single command and to a whole pipe chain
    pub command_timeout_secs: u64,
    /// Grace period between terminate and force-kill for background processes
    pub kill_grace_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            kill_grace_secs: DEFAULT_KILL_GRACE_SECS,
        }
    }
}

/// Configuration for interactive sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Budget for `start()` to observe a success, failure, or prompt line
    pub connect_timeout_secs: u64,
    /// Idle budget enforced by the liveness monitor
    pub idle_timeout_secs: u64,
    /// Grace period between the exit phrase / terminate and force-kill
    pub kill_grace_secs: u64,
    /// Liveness monitor tick
    pub monitor_interval_secs: u64,
    /// Output-queue poll interval
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            kill_grace_secs: DEFAULT_KILL_GRACE_SECS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}
