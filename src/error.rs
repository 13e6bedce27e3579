//! Error types for shellflow

use thiserror::Error;

/// Execution error type.
///
/// These stay internal to the engine: the public chain and session surfaces
/// collapse every variant into a boolean-plus-message result (or a terminal
/// session state) so callers can branch on a simple success flag.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS could not create the process (missing binary, permission denied)
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// A command or connect attempt exceeded its budget
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Process execution failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
