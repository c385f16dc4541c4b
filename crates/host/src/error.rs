//! Host error types.

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Tool registration failed; the host cannot start.
    #[error("startup failed: {0}")]
    Registry(#[from] mcp::RegistryError),

    #[error(transparent)]
    Transport(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
