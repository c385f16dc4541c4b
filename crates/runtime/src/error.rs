use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("completion API: {0}")]
    Model(#[from] ModelError),

    #[error("tool loop exceeded: the model still requested tools after {rounds} rounds")]
    ToolLoopExceeded { rounds: usize },

    #[error("tool host: {0}")]
    Host(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
