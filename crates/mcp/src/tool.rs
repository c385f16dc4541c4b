//! Tool descriptors, call requests and call results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::protocol::{CallToolResult, JsonRpcError, Tool, ToolContent, codes};
use crate::schema::{InputSchema, SchemaError};

/// A registered tool: its name, human description and declared input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The `tools/list` wire form.
    pub fn to_wire(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.to_json(),
        }
    }

    pub fn from_wire(tool: &Tool) -> Result<Self, SchemaError> {
        Ok(Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: InputSchema::from_json(&tool.input_schema)?,
        })
    }
}

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Why a tool call did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    ExecutionError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::ExecutionError => "execution_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output produced by a tool handler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub structured: Option<Value>,
}

impl ToolOutput {
    /// Plain text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            structured: None,
        }
    }

    /// Structured output, also rendered as a text block for text-only clients.
    pub fn json(value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            content: vec![ToolContent::text(text)],
            structured: Some(value),
        }
    }
}

/// Outcome of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    Success {
        content: Vec<ToolContent>,
        structured: Option<Value>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl ToolCallResult {
    pub fn success(output: ToolOutput) -> Self {
        Self::Success {
            content: output.content,
            structured: output.structured,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            Self::Success { .. } => None,
        }
    }

    pub fn structured(&self) -> Option<&Value> {
        match self {
            Self::Success { structured, .. } => structured.as_ref(),
            Self::Failure { .. } => None,
        }
    }

    /// Text blocks joined by newlines, or the failure message.
    pub fn text(&self) -> String {
        match self {
            Self::Success { content, .. } => content
                .iter()
                .filter_map(ToolContent::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Failure { message, .. } => message.clone(),
        }
    }

    /// Encode for the wire.
    ///
    /// Lookup and validation failures become JSON-RPC errors tagged with
    /// `data.kind`; execution failures are an `isError` call result.
    pub fn into_wire(self) -> Result<CallToolResult, JsonRpcError> {
        match self {
            Self::Success {
                content,
                structured,
            } => Ok(CallToolResult {
                content,
                structured_content: structured,
                is_error: false,
            }),
            Self::Failure {
                kind: FailureKind::ExecutionError,
                message,
            } => Ok(CallToolResult {
                content: vec![ToolContent::text(message)],
                structured_content: None,
                is_error: true,
            }),
            Self::Failure { kind, message } => {
                let code = match kind {
                    FailureKind::UnknownTool => codes::METHOD_NOT_FOUND,
                    _ => codes::INVALID_PARAMS,
                };
                Err(JsonRpcError::new(code, message).with_data(json!({ "kind": kind })))
            }
        }
    }

    /// Decode a `tools/call` result.
    pub fn from_call_result(result: CallToolResult) -> Self {
        if result.is_error {
            let message = result
                .content
                .iter()
                .filter_map(ToolContent::as_text)
                .collect::<Vec<_>>()
                .join("\n");
            Self::failure(FailureKind::ExecutionError, message)
        } else {
            Self::Success {
                content: result.content,
                structured: result.structured_content,
            }
        }
    }

    /// Decode a JSON-RPC error that carries a tool failure kind.
    ///
    /// Returns `None` for protocol errors that are not about the tool call.
    pub fn from_rpc_error(error: &JsonRpcError) -> Option<Self> {
        let kind = error.data.as_ref()?.get("kind")?;
        let kind: FailureKind = serde_json::from_value(kind.clone()).ok()?;
        Some(Self::failure(kind, error.message.clone()))
    }
}
