//! Command Chain Executor
//!
//! Executes command-chain expressions containing the control operators `;`,
//! `&&`, `||`, `|`, and a trailing `&`. Dispatch is operator-priority based
//! and recursive: every branch re-enters the same dispatch on its
//! sub-expressions, so an AND branch may itself contain a pipe.
//!
//! The executor never returns a typed error. Every failure mode (spawn
//! failure, nonzero exit, timeout) collapses into `(success: false,
//! output: message)` so a calling layer can branch on the flag alone.

mod parser;
mod runner;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::error::Error;
use crate::process::ProcessManager;
use parser::ChainOp;

/// Outcome of a chain execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainResult {
    /// Whether the chain as a whole succeeded
    pub success: bool,
    /// Collapsed output: command output on success, diagnostic text otherwise
    pub output: String,
}

impl ChainResult {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    fn fail(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// One submitted chain, recorded in the executor's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// The chain expression as submitted
    pub command: String,
    /// Submission time
    pub timestamp: DateTime<Utc>,
}

/// Executes command-chain expressions.
pub struct ChainExecutor {
    config: ChainConfig,
    processes: ProcessManager,
    history: Mutex<Vec<HistoryEntry>>,
}

impl ChainExecutor {
    /// Create an executor with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    /// Create an executor with custom timeouts.
    #[must_use]
    pub fn with_config(config: ChainConfig) -> Self {
        let processes = ProcessManager::with_grace(config.kill_grace_secs);
        Self {
            config,
            processes,
            history: Mutex::new(Vec::new()),
        }
    }

    /// The background-process registry fed by `cmd &` chains.
    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    /// Snapshot of every chain submitted so far, in order.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// Execute a chain expression.
    pub async fn execute(&self, chain: &str) -> ChainResult {
        info!(chain, "executing command chain");
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(HistoryEntry {
                command: chain.to_string(),
                timestamp: Utc::now(),
            });
        self.dispatch(chain).await
    }

    /// Recursive operator dispatch. Boxed because async recursion needs an
    /// indirection through the heap.
    fn dispatch<'a>(&'a self, expr: &'a str) -> BoxFuture<'a, ChainResult> {
        async move {
            match parser::parse(expr) {
                ChainOp::Background(cmd) => self.run_background(&cmd),
                ChainOp::Sequential(parts) => self.run_sequential(&parts).await,
                ChainOp::Or(parts) => self.run_or(&parts).await,
                ChainOp::And(parts) => self.run_and(&parts).await,
                ChainOp::Pipe(stages) => self.run_pipe(&stages).await,
                ChainOp::Single(cmd) => self.run_single(&cmd).await,
            }
        }
        .boxed()
    }

    fn run_background(&self, command: &str) -> ChainResult {
        match self.processes.start(command, None) {
            Ok(id) => ChainResult::ok(id),
            Err(e) => ChainResult::fail(e.to_string()),
        }
    }

    /// `a; b; c`: every part runs regardless of outcomes; the chain itself
    /// always reports success.
    async fn run_sequential(&self, parts: &[String]) -> ChainResult {
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            let result = self.dispatch(part).await;
            segments.push(format!("[{part}] -> {}", result.output));
        }
        ChainResult::ok(segments.join("\n"))
    }

    /// `a || b`: stop at the first success.
    async fn run_or(&self, parts: &[String]) -> ChainResult {
        let mut segments = Vec::new();
        for part in parts {
            let result = self.dispatch(part).await;
            segments.push(format!("[{part}] -> {}", result.output));
            if result.success {
                return ChainResult::ok(format!("{}\n(Chain succeeded)", segments.join("\n")));
            }
        }
        ChainResult::fail(format!("{}\n(All commands failed)", segments.join("\n")))
    }

    /// `a && b`: stop at the first failure.
    async fn run_and(&self, parts: &[String]) -> ChainResult {
        let mut segments = Vec::new();
        for part in parts {
            let result = self.dispatch(part).await;
            segments.push(format!("[{part}] -> {}", result.output));
            if !result.success {
                return ChainResult::fail(format!(
                    "{}\n(Chain stopped due to failure)",
                    segments.join("\n")
                ));
            }
        }
        ChainResult::ok(segments.join("\n"))
    }

    async fn run_pipe(&self, stages: &[String]) -> ChainResult {
        match runner::run_pipe(stages, self.config.command_timeout_secs).await {
            Ok(out) => {
                let output = out.display_output();
                if out.success {
                    ChainResult::ok(output)
                } else {
                    ChainResult::fail(output)
                }
            }
            Err(e) => self.collapse(e),
        }
    }

    async fn run_single(&self, command: &str) -> ChainResult {
        debug!(command, "executing single command");
        match runner::run_single(command, self.config.command_timeout_secs).await {
            Ok(out) => {
                let output = out.display_output();
                if out.success {
                    ChainResult::ok(output)
                } else {
                    ChainResult::fail(output)
                }
            }
            Err(e) => self.collapse(e),
        }
    }

    fn collapse(&self, error: Error) -> ChainResult {
        match error {
            Error::Timeout(secs) => {
                ChainResult::fail(format!("Command timed out after {secs} seconds"))
            }
            other => ChainResult::fail(other.to_string()),
        }
    }
}

impl Default for ChainExecutor {
    fn default() -> Self {
        Self::new()
    }
}
