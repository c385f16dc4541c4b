//! MCP (Model Context Protocol) plumbing shared by the tool host and the
//! orchestrator.
//!
//! The host side builds a [`ToolRegistry`] and serves it with [`McpServer`];
//! the orchestrator side connects with [`McpClient`], completes the
//! handshake, and lists and calls tools.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{McpClient, ServerConfig};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     name: "knowledge-base".to_string(),
//!     command: "kb-host".to_string(),
//!     args: vec![],
//!     env: HashMap::new(),
//! };
//!
//! let client = McpClient::spawn(config).await?;
//! client.initialize().await?;
//!
//! for tool in client.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = client.call_tool("add", serde_json::json!({"a": 1, "b": 2})
//!     .as_object()
//!     .cloned()).await?;
//! println!("{}", result.text());
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod registry;
mod schema;
mod server;
mod tool;
mod transport;

pub use client::{ConnectionState, DEFAULT_TIMEOUT, McpClient, ServerConfig};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, Tool, ToolContent, codes, methods,
};
pub use registry::{ExecutionError, RegistryError, ToolHandler, ToolRegistry};
pub use schema::{ArgumentError, InputSchema, ParamSpec, ParamType, SchemaError, integer_arg};
pub use server::{ACCEPT_BACKOFF, McpServer};
pub use tool::{FailureKind, ToolCallRequest, ToolCallResult, ToolDescriptor, ToolOutput};
pub use transport::{
    DEFAULT_HOST, DEFAULT_PORT, MAX_MESSAGE_SIZE, MessageReader, MessageWriter, TransportKind,
};
