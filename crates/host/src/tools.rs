//! Built-in tools: integer arithmetic and the knowledge-base lookup.

use std::sync::Arc;

use async_trait::async_trait;
use mcp::{
    ExecutionError, InputSchema, ParamType, RegistryError, ToolDescriptor, ToolHandler, ToolOutput,
    ToolRegistry, integer_arg,
};
use serde_json::{Map, Value, json};

use crate::knowledge::KnowledgeBase;

/// Binary integer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
}

impl Operation {
    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
        }
    }

    /// Checked `i64` arithmetic; `None` on overflow.
    pub fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Self::Add => a.checked_add(b),
            Self::Subtract => a.checked_sub(b),
        }
    }
}

/// `add` / `subtract` over two `i64` operands.
///
/// Overflow is reported as an execution error rather than wrapping.
#[derive(Debug)]
pub struct Arithmetic(pub Operation);

#[async_trait]
impl ToolHandler for Arithmetic {
    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError> {
        let a = integer_arg(&arguments, "a")?;
        let b = integer_arg(&arguments, "b")?;
        let op = self.0;
        let value = op.apply(a, b).ok_or_else(|| {
            ExecutionError::new(format!("integer overflow computing {a} {} {b}", op.symbol()))
        })?;
        Ok(ToolOutput::json(json!(value)))
    }
}

/// `get_knowledge_base`: the whole base as formatted text. Never fails.
#[derive(Debug)]
pub struct KnowledgeLookup {
    knowledge: Arc<KnowledgeBase>,
}

impl KnowledgeLookup {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl ToolHandler for KnowledgeLookup {
    async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolOutput, ExecutionError> {
        Ok(ToolOutput::text(self.knowledge.render()))
    }
}

fn operands(verb: &str) -> InputSchema {
    InputSchema::empty()
        .required("a", ParamType::Integer, &format!("First number to {verb}"))
        .required("b", ParamType::Integer, &format!("Second number to {verb}"))
}

/// Register `add`, `subtract` and `get_knowledge_base`, in that order.
pub fn register_builtin(
    registry: &mut ToolRegistry,
    knowledge: Arc<KnowledgeBase>,
) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new("add", "Add two numbers together", operands("add")),
        Arc::new(Arithmetic(Operation::Add)),
    )?;
    registry.register(
        ToolDescriptor::new(
            "subtract",
            "Subtract the second number from the first",
            operands("subtract"),
        ),
        Arc::new(Arithmetic(Operation::Subtract)),
    )?;
    registry.register(
        ToolDescriptor::new(
            "get_knowledge_base",
            "Retrieve the entire knowledge base as a formatted string",
            InputSchema::empty(),
        ),
        Arc::new(KnowledgeLookup::new(knowledge)),
    )?;
    Ok(())
}
