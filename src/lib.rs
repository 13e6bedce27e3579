//! Shellflow - Command-Chain Execution Engine and Interactive Session Manager
//!
//! This crate is the execution core for a command-driven assistant:
//! - Chain: operator-aware execution of command expressions (`;`, `&&`,
//!   `||`, `|`, trailing `&`) with bounded blocking
//! - Process: registry of background processes with per-process monitors
//! - Session: long-lived interactive programs (remote shells, database
//!   clients, REPLs) with pattern-based connect detection and idle eviction
//!
//! Every failure mode is recovered locally: the chain executor answers with
//! `(success, output)` and sessions with a terminal state, never a panic.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod config;
pub mod error;
pub mod process;
pub mod session;
mod spawn;

pub use chain::{ChainExecutor, ChainResult, HistoryEntry};
pub use config::{ChainConfig, SessionConfig};
pub use error::{Error, Result};
pub use process::{BackgroundProcess, ProcessManager, ProcessStatus};
pub use session::{
    CommandRecord, InteractiveSession, SessionContext, SessionManager, SessionState,
    SessionStatus, SessionType, TranscriptEntry, TranscriptKind,
};
