//! Orchestrator runtime: completion backends, the tool catalog translator,
//! and the query loop that connects a model to an MCP tool host.
//!
//! # Overview
//!
//! - **Session**: answers queries, dispatching the model's tool calls to a
//!   [`ToolHost`] and feeding results back until the model replies in text.
//! - **Backend**: a trait over completion APIs ([`OpenAiBackend`],
//!   [`AnthropicBackend`]).
//! - **McpToolHost**: a [`ToolHost`] backed by an [`mcp::McpClient`].
//!
//! # Example
//!
//! ```no_run
//! use runtime::{McpToolHost, OpenAiBackend, Session};
//! use std::time::Duration;
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = OpenAiBackend::builder("sk-...", "gpt-4o").build();
//! let host = McpToolHost::connect_tcp("127.0.0.1:8050", Duration::from_secs(15)).await?;
//!
//! let mut session = Session::new(backend, Some(host));
//! let answer = session.chat("What is 25 + 17?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod error;
pub mod model;
mod providers;
mod session;
pub mod tools;

pub use catalog::CatalogError;
pub use error::{Error, Result};
pub use model::{Backend, Message, ModelError, Part, Role, ToolCall, ToolResult, ToolSpec, Usage};
pub use providers::{
    AnthropicBackend, AnthropicBackendBuilder, GITHUB_MODELS_URL, OPENAI_API_URL, OpenAiBackend,
    OpenAiBackendBuilder,
};
pub use session::{
    DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_TOOL_TIMEOUT, FALLBACK_SYSTEM_PROMPT, Session, SessionState,
};
pub use tools::{McpToolHost, ToolError, ToolHost};
