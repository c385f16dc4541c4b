//! Knowledge-base tool host.
//!
//! Builds the tool registry (`add`, `subtract`, `get_knowledge_base`) once at
//! startup and serves it over stdio or TCP.
//!
//! # Example
//!
//! ```no_run
//! use host::{HostConfig, HostContext};
//!
//! # async fn example() -> host::Result<()> {
//! let context = HostContext::new(&HostConfig::default())?;
//! context.serve().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod knowledge;
mod tools;

use std::sync::Arc;

use mcp::{Implementation, McpServer, ToolRegistry, TransportKind};
use tracing::info;

pub use config::{CONFIG_FILE, ConfigError, HostConfig};
pub use error::{Error, Result};
pub use knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeSource, NO_KNOWLEDGE_BASE, ParseError};
pub use tools::{Arithmetic, KnowledgeLookup, Operation, register_builtin};

/// Everything the host needs, constructed once before any traffic.
pub struct HostContext {
    config: HostConfig,
    knowledge: Arc<KnowledgeBase>,
    registry: Arc<ToolRegistry>,
}

impl HostContext {
    /// Load the knowledge base and register the built-in tools.
    pub fn new(config: &HostConfig) -> Result<Self> {
        let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge_base));
        Self::with_knowledge(config, knowledge)
    }

    pub fn with_knowledge(config: &HostConfig, knowledge: Arc<KnowledgeBase>) -> Result<Self> {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry, Arc::clone(&knowledge))?;
        info!(tools = registry.len(), entries = knowledge.entries().len(), "host ready");

        Ok(Self {
            config: config.clone(),
            knowledge,
            registry: Arc::new(registry),
        })
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// An MCP server over the shared registry.
    pub fn server(&self) -> McpServer {
        McpServer::new(
            Arc::clone(&self.registry),
            Implementation {
                name: self.config.name.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        )
    }

    /// Serve on the configured binding until the channel closes (stdio) or
    /// forever (TCP).
    pub async fn serve(&self) -> Result<()> {
        let server = self.server();
        match self.config.transport {
            TransportKind::Stdio => server.serve_stdio().await?,
            TransportKind::Tcp => server.serve_tcp(&self.config.host, self.config.port).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::{FailureKind, MAX_MESSAGE_SIZE, McpClient};
    use serde_json::json;

    fn serve_in_memory(context: &HostContext) -> McpClient {
        let server = context.server();
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (their_read, their_write) = tokio::io::split(theirs);
        tokio::spawn(async move { server.serve(their_read, their_write).await });
        let (read, write) = tokio::io::split(ours);
        McpClient::connect("kb", read, write)
    }

    #[test]
    fn context_registers_builtin_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            knowledge_base: dir.path().join("absent.json"),
            ..HostConfig::default()
        };
        let context = HostContext::new(&config).unwrap();
        assert_eq!(context.registry().len(), 3);
        assert_eq!(context.knowledge().source(), KnowledgeSource::Defaults);
    }

    #[tokio::test]
    async fn serves_builtin_tools_end_to_end() {
        let context = HostContext::with_knowledge(
            &HostConfig::default(),
            Arc::new(KnowledgeBase::from_entries(vec![KnowledgeEntry::new("Q", "A")])),
        )
        .unwrap();

        let client = serve_in_memory(&context);
        client.initialize().await.unwrap();
        let info = client.server_info().await.unwrap();
        assert_eq!(info.server_info.name, "knowledge-base-server");

        let names: Vec<String> = client.tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["add", "subtract", "get_knowledge_base"]);

        let result = client
            .call_tool("subtract", json!({"a": 10, "b": 4}).as_object().cloned())
            .await
            .unwrap();
        assert_eq!(result.text(), "6");

        let result = client.call_tool("get_knowledge_base", None).await.unwrap();
        assert_eq!(result.text(), "Q: Q\nA: A\n");
    }

    #[tokio::test]
    async fn oversized_knowledge_base_fails_only_its_own_call() {
        let answer = "a".repeat(2 * MAX_MESSAGE_SIZE);
        let context = HostContext::with_knowledge(
            &HostConfig::default(),
            Arc::new(KnowledgeBase::from_entries(vec![KnowledgeEntry::new("Big?", answer)])),
        )
        .unwrap();
        let client = serve_in_memory(&context);
        client.initialize().await.unwrap();

        let (lookup, sum) = tokio::join!(
            client.call_tool("get_knowledge_base", None),
            client.call_tool("add", json!({"a": 2, "b": 3}).as_object().cloned()),
        );
        let lookup = lookup.unwrap();
        assert_eq!(lookup.failure_kind(), Some(FailureKind::ExecutionError));
        assert!(lookup.text().contains("message limit"));
        assert_eq!(sum.unwrap().text(), "5");

        let result = client
            .call_tool("add", json!({"a": 2, "b": 3}).as_object().cloned())
            .await
            .unwrap();
        assert_eq!(result.text(), "5");
    }
}
