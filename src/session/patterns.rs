//! Session types and line-pattern classification
//!
//! Interactive programs announce readiness (or failure) through unstructured
//! text. Each session type carries a vocabulary: prompt regexes that mark
//! the program ready for input, connection success/failure phrases, and the
//! canned exit phrase used on close.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of interactive program a session wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Remote shell via an ssh client
    Ssh,
    /// Database client (mysql, psql, sqlite, mongo)
    Database,
    /// Python REPL
    Python,
    /// Node.js REPL
    Node,
    /// PowerShell
    Powershell,
    /// Windows command prompt
    Cmd,
    /// Anything else
    Generic,
}

impl SessionType {
    /// Auto-detect the session type from the command text.
    #[must_use]
    pub fn detect(command: &str) -> Self {
        let lower = command.to_lowercase();
        if lower.contains("ssh") {
            Self::Ssh
        } else if ["mysql", "psql", "sqlite", "mongo"]
            .iter()
            .any(|db| lower.contains(db))
        {
            Self::Database
        } else if lower.contains("python") {
            Self::Python
        } else if lower.contains("node") {
            Self::Node
        } else if lower.contains("powershell") || lower.contains("pwsh") {
            Self::Powershell
        } else if lower.contains("cmd") {
            Self::Cmd
        } else {
            Self::Generic
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Database => "database",
            Self::Python => "python",
            Self::Node => "node",
            Self::Powershell => "powershell",
            Self::Cmd => "cmd",
            Self::Generic => "generic",
        }
    }

    /// The canned phrase sent to ask the program to exit on its own.
    #[must_use]
    pub fn exit_command(&self) -> &'static str {
        match self {
            Self::Ssh | Self::Powershell | Self::Cmd | Self::Generic => "exit",
            Self::Database => "quit",
            Self::Python => "exit()",
            Self::Node => ".exit",
        }
    }

    fn prompt_patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Ssh | Self::Generic => &[
                r"[^@]+@[^:]+:.*\$\s*$", // user@host:path$
                r"[^@]+@[^:]+:.*#\s*$",  // user@host:path#
                r".*\$\s*$",
                r".*#\s*$",
            ],
            Self::Database => &[r".*>\s*$", r".*\]\s*$", r".*:\s*$"],
            Self::Python => &[r">>>\s*$", r"\.\.\.\s*$"],
            Self::Node => &[r">\s*$", r"\.\.\.\s*$"],
            Self::Powershell => &[r"PS\s+.*>\s*$"],
            Self::Cmd => &[r"[A-Z]:\\.*>\s*$"],
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phrases that mean the connection came up (matched case-insensitively).
const SUCCESS_PATTERNS: &[&str] = &[
    "connected",
    "login successful",
    "welcome",
    "authenticated",
    "established",
];

/// Phrases that mean the connection failed (matched case-insensitively).
const FAILURE_PATTERNS: &[&str] = &[
    "connection refused",
    "authentication failed",
    "permission denied",
    "host unreachable",
    "timeout",
];

/// Interactive credential/confirmation prompts: the program is waiting for
/// input, which counts as a live connection.
const AUTH_PROMPT_PATTERNS: &[&str] =
    &["password:", "passphrase:", "username:", "yes/no?", "continue?"];

/// How a line of connect-phase output was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineMatch {
    /// A connection-success phrase
    Success,
    /// A connection-failure phrase
    Failure,
    /// The session type's readiness prompt
    Prompt,
    /// A credential or confirmation prompt
    AuthPrompt,
}

/// Compiled pattern vocabulary for one session.
pub(crate) struct PatternSet {
    prompts: Vec<Regex>,
}

impl PatternSet {
    pub fn for_type(session_type: SessionType) -> Self {
        let prompts = session_type
            .prompt_patterns()
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { prompts }
    }

    /// Classify one line of output, or `None` if it matches nothing.
    ///
    /// Failure phrases win over everything else: a line like
    /// "connection refused" must never be taken as a prompt.
    pub fn classify(&self, line: &str) -> Option<LineMatch> {
        let lower = line.to_lowercase();
        if FAILURE_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Some(LineMatch::Failure);
        }
        if SUCCESS_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Some(LineMatch::Success);
        }
        if AUTH_PROMPT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Some(LineMatch::AuthPrompt);
        }
        if self.prompts.iter().any(|re| re.is_match(line)) {
            return Some(LineMatch::Prompt);
        }
        None
    }
}
