//! Tool registry and dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::ArgumentError;
use crate::tool::{FailureKind, ToolCallRequest, ToolCallResult, ToolDescriptor, ToolOutput};

/// A fault raised by a tool body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExecutionError(pub String);

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ArgumentError> for ExecutionError {
    fn from(e: ArgumentError) -> Self {
        Self(e.to_string())
    }
}

/// Executable behavior behind a registered tool.
///
/// Arguments reaching [`ToolHandler::execute`] have already passed the
/// descriptor's schema and [`ToolHandler::validate`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Extra checks beyond the declared schema.
    fn validate(&self, _arguments: &Map<String, Value>) -> Result<(), ArgumentError> {
        Ok(())
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
}

struct Entry {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Name → handler mapping, populated once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }
        debug!(tool = %descriptor.name, "registered tool");
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Catalog in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entry(name).map(|e| &e.descriptor)
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Look up, validate and run a tool.
    ///
    /// Never fails: every outcome, including a panicking handler, is folded
    /// into a [`ToolCallResult`]. The handler runs on its own task so a panic
    /// stays contained to this call.
    pub async fn invoke(&self, request: ToolCallRequest) -> ToolCallResult {
        let name = request.tool_name;
        let Some(entry) = self.entry(&name) else {
            debug!(tool = %name, "unknown tool");
            return ToolCallResult::failure(FailureKind::UnknownTool, format!("unknown tool: {name}"));
        };

        let checked = entry
            .descriptor
            .input_schema
            .validate(&request.arguments)
            .and_then(|()| entry.handler.validate(&request.arguments));
        if let Err(e) = checked {
            debug!(tool = %name, error = %e, "rejected arguments");
            return ToolCallResult::failure(
                FailureKind::InvalidArguments,
                format!("invalid arguments for `{name}`: {e}"),
            );
        }

        let handler = Arc::clone(&entry.handler);
        let arguments = request.arguments;
        match tokio::spawn(async move { handler.execute(arguments).await }).await {
            Ok(Ok(output)) => ToolCallResult::success(output),
            Ok(Err(e)) => ToolCallResult::failure(
                FailureKind::ExecutionError,
                format!("tool `{name}` failed: {e}"),
            ),
            Err(join) => {
                warn!(tool = %name, error = %join, "tool task aborted");
                let cause = if join.is_panic() { "panicked" } else { "was cancelled" };
                ToolCallResult::failure(
                    FailureKind::ExecutionError,
                    format!("tool `{name}` {cause}"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InputSchema, ParamType, integer_arg};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolHandler for Counting {
        async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a = integer_arg(&arguments, "a")?;
            let b = integer_arg(&arguments, "b")?;
            Ok(ToolOutput::json(json!(a + b)))
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError> {
            if arguments.is_empty() {
                panic!("handler bug");
            }
            Ok(ToolOutput::default())
        }
    }

    struct RejectsZero;

    #[async_trait]
    impl ToolHandler for RejectsZero {
        fn validate(&self, arguments: &Map<String, Value>) -> Result<(), ArgumentError> {
            match arguments.get("n") {
                Some(n) if n == &json!(0) => Err(ArgumentError::new("n", "must be non-zero")),
                _ => Ok(()),
            }
        }

        async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError> {
            Ok(ToolOutput::text("ok"))
        }
    }

    fn pair() -> InputSchema {
        InputSchema::empty()
            .required("a", ParamType::Integer, "")
            .required("b", ParamType::Integer, "")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn counting_registry() -> (ToolRegistry, Arc<Counting>) {
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::new("add", "Add", pair()), handler.clone())
            .unwrap();
        (registry, handler)
    }

    #[test]
    fn duplicate_registration_fails() {
        let (mut registry, handler) = counting_registry();
        let err = registry
            .register(ToolDescriptor::new("add", "Again", pair()), handler)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("add".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_is_stable_and_ordered() {
        let (mut registry, handler) = counting_registry();
        registry
            .register(ToolDescriptor::new("zzz", "Last", pair()), handler.clone())
            .unwrap();
        registry
            .register(ToolDescriptor::new("aaa", "After", pair()), handler)
            .unwrap();

        let first = registry.list();
        let names: Vec<&str> = first.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["add", "zzz", "aaa"]);
        assert_eq!(registry.list(), first);
    }

    #[tokio::test]
    async fn invoke_runs_handler() {
        let (registry, handler) = counting_registry();
        let result = registry
            .invoke(ToolCallRequest::new("add", args(json!({"a": 2, "b": 3}))))
            .await;
        assert_eq!(result.structured(), Some(&json!(5)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let (registry, _) = counting_registry();
        let result = registry
            .invoke(ToolCallRequest::new("nonexistent", Map::new()))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::UnknownTool));
        assert!(result.text().contains("nonexistent"));
    }

    #[tokio::test]
    async fn invalid_arguments_skip_the_handler() {
        let (registry, handler) = counting_registry();
        let result = registry
            .invoke(ToolCallRequest::new("add", args(json!({"a": "x", "b": 3}))))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidArguments));
        assert!(result.text().contains("parameter `a`"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_validate_hook_runs_after_schema() {
        let mut registry = ToolRegistry::new();
        let schema = InputSchema::empty().required("n", ParamType::Integer, "");
        registry
            .register(ToolDescriptor::new("nz", "", schema), Arc::new(RejectsZero))
            .unwrap();

        let result = registry
            .invoke(ToolCallRequest::new("nz", args(json!({"n": 0}))))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidArguments));
        assert!(result.text().contains("must be non-zero"));

        let result = registry
            .invoke(ToolCallRequest::new("nz", args(json!({"n": 4}))))
            .await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn panicking_handler_becomes_execution_error() {
        let (mut registry, _) = counting_registry();
        registry
            .register(ToolDescriptor::new("boom", "", InputSchema::empty()), Arc::new(Panics))
            .unwrap();

        let result = registry.invoke(ToolCallRequest::new("boom", Map::new())).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ExecutionError));

        let result = registry
            .invoke(ToolCallRequest::new("add", args(json!({"a": 1, "b": 1}))))
            .await;
        assert!(result.is_success());
    }
}
