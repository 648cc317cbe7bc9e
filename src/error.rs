//! # Errors
//!
//! Two layers of failure exist. Tool-level errors (`ToolError`, `PatchError`) are
//! captured into a `ToolResult` and handed back to the model as conversation
//! context. Loop-level errors (`AgentError`) end a run and are returned to the caller.

use thiserror::Error;

/// Failures produced by the patch engine while parsing or applying a diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("patch conflict in '{path}' at hunk {hunk}: context or removed lines do not match")]
    Conflict { path: String, hunk: usize },

    #[error("cannot patch '{path}': file does not exist")]
    MissingFile { path: String },

    #[error("cannot create '{path}': file already exists")]
    AlreadyExists { path: String },

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },
}

impl PatchError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Failures of a single tool call. These never abort the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("SandboxViolation: path '{path}' resolves outside the working directory")]
    SandboxViolation { path: String },

    #[error("NotFound: {path}")]
    NotFound { path: String },

    #[error("Timeout: command did not finish within {seconds}s and was killed")]
    Timeout { seconds: u64 },

    #[error("PatchError: {0}")]
    Patch(#[from] PatchError),

    #[error("Rejected: tool call was denied by the approval callback")]
    Rejected,

    #[error("Exit code: {code}")]
    NonZeroExit { code: i32 },

    #[error("InvalidArguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("UnknownTool: '{0}'")]
    UnknownTool(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Io(e.to_string())
    }
}

/// Terminal outcomes of a `run` that are not a normal finish.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0:#}")]
    ModelCallFailed(anyhow::Error),

    #[error("run cancelled while waiting for the model")]
    Cancelled,

    #[error("turn budget of {max_turns} exhausted before the model produced a final answer")]
    BudgetExceeded { max_turns: usize },
}
