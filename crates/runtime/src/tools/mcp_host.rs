//! MCP-backed tool host.

use std::time::Duration;

use mcp::{McpClient, ServerConfig, ToolCallResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{ToolError, ToolHost};
use crate::catalog;
use crate::model::{ToolCall, ToolSpec};

/// Tool host backed by an MCP server.
///
/// Holds an initialized client and the translated catalog, fetched once on
/// connect.
pub struct McpToolHost {
    client: McpClient,
    specs: Vec<ToolSpec>,
}

impl McpToolHost {
    /// Spawn the host process and complete the handshake.
    pub async fn spawn(config: ServerConfig, timeout: Duration) -> Result<Self, mcp::Error> {
        let client = McpClient::spawn(config).await?.with_timeout(timeout);
        Self::from_client(client).await
    }

    /// Connect to a host listening on `addr` and complete the handshake.
    pub async fn connect_tcp(addr: &str, timeout: Duration) -> Result<Self, mcp::Error> {
        let client = McpClient::connect_tcp(addr, addr).await?.with_timeout(timeout);
        Self::from_client(client).await
    }

    /// Initialize an already-connected client and cache its catalog.
    pub async fn from_client(client: McpClient) -> Result<Self, mcp::Error> {
        client.initialize().await?;
        let specs = catalog::translate_all(&client.tools().await);
        debug!(server = client.name(), tools = specs.len(), "tool catalog loaded");
        Ok(Self { client, specs })
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }
}

/// Model-supplied input as an argument map. `null` means no arguments.
fn arguments(input: &Value) -> Result<Map<String, Value>, ToolError> {
    match input {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(ToolError::InvalidInput(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

impl ToolHost for McpToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let arguments = arguments(&call.input)?;
        match self.client.call_tool(&call.name, Some(arguments)).await? {
            result @ ToolCallResult::Success { .. } => Ok(Value::String(result.text())),
            ToolCallResult::Failure { kind, message } => {
                Err(ToolError::from_failure(kind, message))
            }
        }
    }

    async fn shutdown(self) {
        let name = self.client.name().to_string();
        if let Err(e) = self.client.shutdown().await {
            warn!(server = %name, error = %e, "tool host shutdown failed");
        }
    }
}
