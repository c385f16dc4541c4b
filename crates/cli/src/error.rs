//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reaching the tool host failed.
    #[error("tool host: {0}")]
    Host(#[from] mcp::Error),

    /// The query loop failed.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
