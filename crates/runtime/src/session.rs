//! Query orchestration.
//!
//! A [`Session`] answers one query at a time. Each query starts a fresh
//! conversation: the model is offered the host's catalog, requested tool
//! calls are dispatched concurrently, their results are fed back in request
//! order, and the loop ends when the model replies without tool calls.

use std::time::Duration;

use futures::future::join_all;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::model::{Backend, Message, ModelRequest, ToolCall, ToolResult, ToolSpec};
use crate::tools::{ToolError, ToolHost};
use crate::{Error, Result};

/// Tool rounds allowed per query before giving up.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Per-call deadline for tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = mcp::DEFAULT_TIMEOUT;

/// System prompt used when no tool host is available.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Where the session is in answering a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No tool host; queries are answered without tools.
    Disconnected,
    /// Tool host connected, idle.
    Connected,
    AwaitingCompletion,
    DispatchingTool,
    /// The last query was answered.
    Done,
}

/// Orchestrator for a completion backend and an optional tool host.
pub struct Session<B, H> {
    backend: B,
    host: Option<H>,
    system: Option<String>,
    max_tool_rounds: usize,
    tool_timeout: Duration,
    state: SessionState,
}

impl<B: Backend, H: ToolHost> Session<B, H> {
    /// Create a session. `None` for the host gives tool-less answers.
    pub fn new(backend: B, host: Option<H>) -> Self {
        let state = if host.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        };
        Self {
            backend,
            host,
            system: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            state,
        }
    }

    /// Set the system prompt used when tools are available.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.host.is_some()
    }

    /// Tools offered to the model.
    pub fn tools(&self) -> &[ToolSpec] {
        self.host.as_ref().map(|host| host.specs()).unwrap_or(&[])
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one query.
    pub async fn chat(&mut self, query: &str) -> Result<String> {
        let span = info_span!("query", id = %Uuid::new_v4());
        let result = self.run(query).instrument(span).await;
        if result.is_err() {
            self.state = self.idle_state();
        }
        result
    }

    /// Release the tool host. Later queries are answered without tools.
    pub async fn disconnect(&mut self) {
        if let Some(host) = self.host.take() {
            host.shutdown().await;
        }
        self.state = SessionState::Disconnected;
    }

    fn idle_state(&self) -> SessionState {
        if self.host.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    async fn run(&mut self, query: &str) -> Result<String> {
        let Some(host) = self.host.as_ref() else {
            return self.answer_without_tools(query).await;
        };

        let tools = host.specs();
        let system = self.system.as_deref();
        let mut messages = vec![Message::user(query)];
        let mut rounds = 0;

        loop {
            self.state = SessionState::AwaitingCompletion;
            let response = self
                .backend
                .call(ModelRequest {
                    system,
                    messages: &messages,
                    tools,
                })
                .await?;
            debug!(
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "completion received"
            );

            let calls = response.message.tool_calls();
            if calls.is_empty() {
                self.state = SessionState::Done;
                return Ok(response.message.text());
            }
            if rounds == self.max_tool_rounds {
                warn!(rounds, "model kept requesting tools");
                return Err(Error::ToolLoopExceeded { rounds });
            }
            rounds += 1;

            self.state = SessionState::DispatchingTool;
            info!(round = rounds, calls = calls.len(), "dispatching tool calls");
            messages.push(response.message);
            let results = dispatch(host, &calls, self.tool_timeout).await;
            messages.extend(results.into_iter().map(Message::tool_result));
        }
    }

    async fn answer_without_tools(&mut self, query: &str) -> Result<String> {
        info!("no tool host, answering without tools");
        self.state = SessionState::AwaitingCompletion;
        let messages = [Message::user(query)];
        let response = self
            .backend
            .call(ModelRequest {
                system: Some(FALLBACK_SYSTEM_PROMPT),
                messages: &messages,
                tools: &[],
            })
            .await?;
        self.state = SessionState::Done;
        Ok(response.message.text())
    }
}

/// Run every call concurrently; results come back in request order.
async fn dispatch<H: ToolHost>(host: &H, calls: &[ToolCall], timeout: Duration) -> Vec<ToolResult> {
    join_all(calls.iter().map(|call| async move {
        debug!(tool = %call.name, id = %call.id, "tool call");
        let outcome = match tokio::time::timeout(timeout, host.execute(call)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };
        match outcome {
            Ok(output) => ToolResult::Success {
                tool_call_id: call.id.clone(),
                output,
            },
            Err(error) => {
                warn!(tool = %call.name, error = %error, "tool call failed");
                ToolResult::Failure {
                    tool_call_id: call.id.clone(),
                    error,
                }
            }
        }
    }))
    .await
}
