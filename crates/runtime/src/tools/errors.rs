use mcp::FailureKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("not connected to the tool host")]
    NotConnected,
    #[error("transport: {0}")]
    Transport(String),
}

impl ToolError {
    /// Map a tool-level failure reported by the host.
    pub fn from_failure(kind: FailureKind, message: String) -> Self {
        match kind {
            FailureKind::UnknownTool => Self::NotFound(message),
            FailureKind::InvalidArguments => Self::InvalidInput(message),
            FailureKind::ExecutionError => Self::Execution(message),
        }
    }
}

impl From<mcp::Error> for ToolError {
    fn from(e: mcp::Error) -> Self {
        match e {
            mcp::Error::NotConnected => Self::NotConnected,
            mcp::Error::Timeout { timeout, .. } => {
                Self::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}
