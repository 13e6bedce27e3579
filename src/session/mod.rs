//! Interactive Session: a long-lived child process with open input/output
//!
//! Each started session runs three tasks for its lifetime: a stdout reader,
//! a stderr reader, and a liveness monitor. Stdout and stderr stay two
//! independent line channels; no ordering is guaranteed between them.

mod manager;
mod patterns;

#[cfg(test)]
mod tests;

pub use manager::SessionManager;
pub use patterns::SessionType;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::spawn;
use patterns::{LineMatch, PatternSet};

/// Lifecycle state of an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, not yet started
    Idle,
    /// Process spawned, waiting for a recognizable first line
    Connecting,
    /// Ready for input
    Connected,
    /// Reserved for mid-command suspension; not currently entered
    Executing,
    /// Terminal: process ended, idle timeout, or explicit close
    Disconnected,
    /// Terminal: spawn failure or failed connect
    Error,
}

impl SessionState {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Executing => "executing",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Origin of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    /// Read from stdout
    Output,
    /// Read from stderr
    Error,
}

/// One line of session output, as recorded in the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    /// Which stream the line arrived on
    pub kind: TranscriptKind,
    /// The line, without its trailing newline
    pub content: String,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
}

/// One input line sent to the session.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    /// The input text, without the appended newline
    pub command: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
}

/// Accumulated per-session context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionContext {
    /// Working directory the process was spawned in, when overridden
    pub working_directory: Option<PathBuf>,
    /// Extra environment passed to the process
    pub environment: HashMap<String, String>,
    /// Append-only log of every line read from either stream
    pub transcript: Vec<TranscriptEntry>,
    /// Append-only log of every input sent
    pub command_history: Vec<CommandRecord>,
    /// Last line that matched a readiness prompt
    pub last_prompt: Option<String>,
    /// Last failure observed (spawn error, failure pattern, write error)
    pub last_error: Option<String>,
    /// Why the session left CONNECTED, once it has
    pub disconnect_reason: Option<String>,
}

/// Status snapshot returned to the calling layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Session identifier
    pub session_id: String,
    /// Current state
    pub state: SessionState,
    /// Detected or caller-specified session type
    pub session_type: SessionType,
    /// The command the session wraps
    pub command: String,
    /// Creation time
    pub start_time: DateTime<Utc>,
    /// Time of the last observed input or output
    pub last_activity: DateTime<Utc>,
    /// Seconds since creation
    pub uptime_secs: i64,
    /// OS process id, while known
    pub pid: Option<u32>,
    /// Accumulated context (transcript, history, prompts)
    pub context: SessionContext,
}

/// A single interactive session wrapping one long-lived process.
pub struct InteractiveSession {
    id: String,
    command: String,
    session_type: SessionType,
    config: SessionConfig,
    patterns: PatternSet,
    start_time: DateTime<Utc>,
    state: Arc<Mutex<SessionState>>,
    last_activity: Arc<Mutex<DateTime<Utc>>>,
    pid: Mutex<Option<u32>>,
    context: Arc<Mutex<SessionContext>>,
    child: Arc<tokio::sync::Mutex<Option<Child>>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stdout_rx: tokio::sync::Mutex<Option<UnboundedReceiver<String>>>,
    stderr_rx: tokio::sync::Mutex<Option<UnboundedReceiver<String>>>,
    notice_rx: tokio::sync::Mutex<Option<UnboundedReceiver<String>>>,
}

impl InteractiveSession {
    /// Create an unstarted session.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        session_type: SessionType,
        config: SessionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            session_type,
            patterns: PatternSet::for_type(session_type),
            config,
            start_time: Utc::now(),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            last_activity: Arc::new(Mutex::new(Utc::now())),
            pid: Mutex::new(None),
            context: Arc::new(Mutex::new(SessionContext::default())),
            child: Arc::new(tokio::sync::Mutex::new(None)),
            stdin: tokio::sync::Mutex::new(None),
            stdout_rx: tokio::sync::Mutex::new(None),
            stderr_rx: tokio::sync::Mutex::new(None),
            notice_rx: tokio::sync::Mutex::new(None),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Detected or caller-specified type.
    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Time of the last observed input or output.
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().expect("activity lock poisoned")
    }

    /// Start the session: spawn the process, launch the reader and liveness
    /// tasks, and block until the first recognizable line or the connect
    /// timeout.
    ///
    /// Returns `true` when a success phrase or readiness prompt was seen
    /// (state CONNECTED), `false` on spawn failure, a failure phrase, or
    /// timeout (state ERROR).
    pub async fn start(&self) -> bool {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state != SessionState::Idle {
                return false;
            }
            *state = SessionState::Connecting;
        }
        debug!(id = %self.id, command = %self.command, "session connecting");

        let mut child = match spawn::shell_command(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(id = %self.id, error = %e, "session spawn failed");
                self.record_error(format!("spawn failed: {e}"));
                self.set_state(SessionState::Error);
                return false;
            }
        };

        *self.pid.lock().expect("pid lock poisoned") = child.id();
        *self.last_activity.lock().expect("activity lock poisoned") = Utc::now();

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        if let Some(pipe) = child.stdout.take() {
            self.spawn_reader(pipe, stdout_tx, TranscriptKind::Output, notice_tx.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            self.spawn_reader(pipe, stderr_tx, TranscriptKind::Error, notice_tx.clone());
        }
        *self.stdin.lock().await = child.stdin.take();
        *self.child.lock().await = Some(child);
        *self.stdout_rx.lock().await = Some(stdout_rx);
        *self.stderr_rx.lock().await = Some(stderr_rx);
        *self.notice_rx.lock().await = Some(notice_rx);

        self.spawn_liveness_monitor();

        if self.wait_for_connection().await {
            info!(id = %self.id, "session connected");
            // The liveness monitor may have observed a process exit while we
            // were still classifying output; never resurrect that.
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == SessionState::Connecting {
                *state = SessionState::Connected;
            }
            true
        } else {
            warn!(id = %self.id, "session failed to connect");
            self.set_state(SessionState::Error);
            false
        }
    }

    /// Drain both streams until a line classifies as success, failure, or
    /// prompt, bounded by the connect timeout. On timeout the child is
    /// killed so no unreachable process lingers.
    async fn wait_for_connection(&self) -> bool {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.connect_timeout_secs);
        let mut stdout_guard = self.stdout_rx.lock().await;
        let mut stderr_guard = self.stderr_rx.lock().await;

        while tokio::time::Instant::now() < deadline {
            if let Some(rx) = stdout_guard.as_mut() {
                while let Ok(line) = rx.try_recv() {
                    match self.patterns.classify(&line) {
                        Some(LineMatch::Failure) => {
                            self.record_error(line);
                            return false;
                        }
                        Some(LineMatch::Success | LineMatch::Prompt | LineMatch::AuthPrompt) => {
                            self.context
                                .lock()
                                .expect("context lock poisoned")
                                .last_prompt = Some(line);
                            return true;
                        }
                        None => {}
                    }
                }
            }
            // Stderr is only consulted for failure phrases during connect
            if let Some(rx) = stderr_guard.as_mut() {
                while let Ok(line) = rx.try_recv() {
                    if self.patterns.classify(&line) == Some(LineMatch::Failure) {
                        self.record_error(line);
                        return false;
                    }
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        self.record_error(format!(
            "no recognizable output within {}s",
            self.config.connect_timeout_secs
        ));
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            spawn::terminate(child, self.config.kill_grace()).await;
        }
        false
    }

    /// Write one line of input to the process.
    ///
    /// Valid only in CONNECTED; returns `false` in any other state or on a
    /// write failure.
    pub async fn send_input(&self, text: &str) -> bool {
        if self.state() != SessionState::Connected {
            return false;
        }
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return false;
        };
        let line = format!("{text}\n");
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            self.record_error(format!("input write failed: {e}"));
            return false;
        }
        if let Err(e) = stdin.flush().await {
            self.record_error(format!("input flush failed: {e}"));
            return false;
        }

        let mut context = self.context.lock().expect("context lock poisoned");
        context.command_history.push(CommandRecord {
            command: text.to_string(),
            timestamp: Utc::now(),
        });
        drop(context);
        *self.last_activity.lock().expect("activity lock poisoned") = Utc::now();
        true
    }

    /// Poll the stdout channel for up to `timeout`, returning as soon as at
    /// least one line is available. A low-latency partial read, not a full
    /// drain of everything the process will ever print.
    pub async fn get_output(&self, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut lines = Vec::new();
        let mut guard = self.stdout_rx.lock().await;
        let Some(rx) = guard.as_mut() else {
            return lines;
        };
        loop {
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
            if !lines.is_empty() || tokio::time::Instant::now() >= deadline {
                return lines;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Drain whatever is queued on the stderr channel, without waiting.
    pub async fn take_stderr(&self) -> Vec<String> {
        Self::drain_channel(&self.stderr_rx).await
    }

    /// Drain queued reader-error notices, without waiting.
    pub async fn take_error_notices(&self) -> Vec<String> {
        Self::drain_channel(&self.notice_rx).await
    }

    async fn drain_channel(
        slot: &tokio::sync::Mutex<Option<UnboundedReceiver<String>>>,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        let mut guard = slot.lock().await;
        if let Some(rx) = guard.as_mut() {
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
        }
        lines
    }

    /// Status snapshot for the calling layer.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            state: self.state(),
            session_type: self.session_type,
            command: self.command.clone(),
            start_time: self.start_time,
            last_activity: self.last_activity(),
            uptime_secs: (Utc::now() - self.start_time).num_seconds(),
            pid: *self.pid.lock().expect("pid lock poisoned"),
            context: self
                .context
                .lock()
                .expect("context lock poisoned")
                .clone(),
        }
    }

    /// Close the session: send the type's exit phrase, allow a grace period,
    /// then escalate to terminate/kill. Always ends in DISCONNECTED, also
    /// when a liveness transition got there first.
    pub async fn close(&self) -> bool {
        let exit_phrase = self.session_type.exit_command();
        if self.send_input(exit_phrase).await {
            tokio::time::sleep(self.config.kill_grace()).await;
        }

        {
            let mut guard = self.child.lock().await;
            if let Some(child) = guard.as_mut() {
                spawn::terminate(child, self.config.kill_grace()).await;
            }
            *guard = None;
        }
        *self.stdin.lock().await = None;

        self.set_state(SessionState::Disconnected);
        let mut context = self.context.lock().expect("context lock poisoned");
        if context.disconnect_reason.is_none() {
            context.disconnect_reason = Some("closed".to_string());
        }
        info!(id = %self.id, "session closed");
        true
    }

    fn spawn_reader<R>(
        &self,
        pipe: R,
        tx: UnboundedSender<String>,
        kind: TranscriptKind,
        notice_tx: UnboundedSender<String>,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let last_activity = Arc::clone(&self.last_activity);
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        *last_activity.lock().expect("activity lock poisoned") = Utc::now();
                        context
                            .lock()
                            .expect("context lock poisoned")
                            .transcript
                            .push(TranscriptEntry {
                                kind,
                                content: line.clone(),
                                timestamp: Utc::now(),
                            });
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = notice_tx.send(format!("{kind:?} read error: {e}"));
                        break;
                    }
                }
            }
        });
    }

    /// Liveness monitor: ticks once per interval while the session is live,
    /// disconnecting on process exit or idle timeout.
    fn spawn_liveness_monitor(&self) {
        let id = self.id.clone();
        let state = Arc::clone(&self.state);
        let child = Arc::clone(&self.child);
        let last_activity = Arc::clone(&self.last_activity);
        let context = Arc::clone(&self.context);
        let interval = Duration::from_secs(self.config.monitor_interval_secs);
        let idle_budget = self.config.idle_timeout_secs as i64;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !state.lock().expect("state lock poisoned").is_live() {
                    break;
                }

                let exited = {
                    let mut guard = child.lock().await;
                    match guard.as_mut() {
                        Some(child) => matches!(child.try_wait(), Ok(Some(_))),
                        None => true,
                    }
                };
                if exited {
                    debug!(id = %id, "session process ended");
                    Self::disconnect_live(&state, &context, "process_ended");
                    break;
                }

                let idle_for = (Utc::now()
                    - *last_activity.lock().expect("activity lock poisoned"))
                .num_seconds();
                if idle_for > idle_budget {
                    debug!(id = %id, idle_for, "session idle timeout");
                    Self::disconnect_live(&state, &context, "timeout");
                    break;
                }
            }
        });
    }

    /// Transition to DISCONNECTED, but never overwrite a terminal state a
    /// concurrent close or error path already reached.
    fn disconnect_live(
        state: &Mutex<SessionState>,
        context: &Mutex<SessionContext>,
        reason: &str,
    ) {
        let mut state = state.lock().expect("state lock poisoned");
        if state.is_live() {
            *state = SessionState::Disconnected;
            context
                .lock()
                .expect("context lock poisoned")
                .disconnect_reason = Some(reason.to_string());
        }
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    fn record_error(&self, message: String) {
        self.context
            .lock()
            .expect("context lock poisoned")
            .last_error = Some(message);
    }
}
