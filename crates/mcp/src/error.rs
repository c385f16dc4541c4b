//! MCP error types.

use std::time::Duration;

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not connected: the initialize handshake has not completed")]
    NotConnected,

    #[error("transport closed while waiting for {method} response")]
    TransportClosed { method: String },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {timeout:?} waiting for {method} response")]
    Timeout { method: String, timeout: Duration },

    #[error("failed to (de)serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("message too large (max {max} bytes)")]
    OutputTooLarge { max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
