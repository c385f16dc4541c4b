//! Translation between the host's tool catalog and completion API tool specs.

use mcp::{InputSchema, SchemaError, Tool, ToolDescriptor};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

use crate::model::ToolSpec;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot translate tool `{tool}`: {source}")]
pub struct CatalogError {
    pub tool: String,
    #[source]
    pub source: SchemaError,
}

/// Translate one catalog entry.
///
/// Parameter order, types, descriptions and the required set are kept as
/// declared. A missing description becomes an empty string.
pub fn translate(tool: &Tool) -> Result<ToolSpec, CatalogError> {
    let parameters = InputSchema::from_json(&tool.input_schema).map_err(|source| CatalogError {
        tool: tool.name.clone(),
        source,
    })?;
    Ok(ToolSpec {
        name: tool.name.clone(),
        description: tool.description.clone().unwrap_or_default(),
        parameters,
    })
}

/// Translate a whole catalog, skipping entries whose schema cannot be represented.
pub fn translate_all(tools: &[Tool]) -> Vec<ToolSpec> {
    tools
        .iter()
        .filter_map(|tool| match translate(tool) {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!(error = %e, "skipping tool");
                None
            }
        })
        .collect()
}

/// Inverse of [`translate`].
pub fn to_descriptor(spec: &ToolSpec) -> ToolDescriptor {
    ToolDescriptor::new(&spec.name, &spec.description, spec.parameters.clone())
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.input_schema.clone(),
        }
    }
}

impl ToolSpec {
    /// JSON Schema of the parameters.
    pub fn parameters_json(&self) -> Value {
        self.parameters.to_json()
    }

    /// Chat-completions function form:
    /// `{"type": "function", "function": {name, description, parameters}}`.
    pub fn function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_json(),
            }
        })
    }
}
