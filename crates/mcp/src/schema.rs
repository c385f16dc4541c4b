//! Declared tool input schemas and argument validation.
//!
//! An [`InputSchema`] is an ordered parameter list. It renders to the JSON
//! Schema object MCP puts in `inputSchema` and parses back from it without
//! losing order, types, descriptions or the required set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "integer" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        })
    }

    /// Whether `value` is acceptable for this type.
    ///
    /// Integral floats (`3.0`) count as integers; fractional ones do not.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Integer => as_integer(value).is_some(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

/// Ordered parameter list of a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

/// A schema document that cannot be represented as an [`InputSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object of type \"object\"")]
    NotAnObject,

    #[error("property `{name}` has unsupported type {found}")]
    UnsupportedType { name: String, found: String },

    #[error("required parameter `{0}` is not declared in properties")]
    UnknownRequired(String),

    #[error("parameter `{0}` declared twice")]
    DuplicateParam(String),
}

/// An argument map that does not satisfy the declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parameter `{parameter}`: {reason}")]
pub struct ArgumentError {
    pub parameter: String,
    pub reason: String,
}

impl ArgumentError {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

impl InputSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a required parameter.
    pub fn required(self, name: impl Into<String>, kind: ParamType, description: &str) -> Self {
        self.push(name.into(), kind, description, true)
    }

    /// Append an optional parameter.
    pub fn optional(self, name: impl Into<String>, kind: ParamType, description: &str) -> Self {
        self.push(name.into(), kind, description, false)
    }

    fn push(mut self, name: String, kind: ParamType, description: &str, required: bool) -> Self {
        let description = (!description.is_empty()).then(|| description.to_string());
        self.params.push(ParamSpec {
            name,
            kind,
            description,
            required,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names of required parameters, in declaration order.
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Render as a JSON Schema object.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(param.kind.as_str().into()));
            if let Some(description) = &param.description {
                prop.insert("description".into(), Value::String(description.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
            "additionalProperties": false,
        })
    }

    /// Parse a JSON Schema object produced by [`InputSchema::to_json`] or a
    /// compatible peer.
    pub fn from_json(schema: &Value) -> Result<Self, SchemaError> {
        let obj = schema.as_object().ok_or(SchemaError::NotAnObject)?;
        if let Some(kind) = obj.get("type") {
            if kind != "object" {
                return Err(SchemaError::NotAnObject);
            }
        }

        let required: Vec<&str> = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params: Vec<ParamSpec> = Vec::new();
        if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
            for (name, prop) in properties {
                let found = prop.get("type").cloned().unwrap_or(Value::Null);
                let kind = found
                    .as_str()
                    .and_then(ParamType::parse)
                    .ok_or_else(|| SchemaError::UnsupportedType {
                        name: name.clone(),
                        found: found.to_string(),
                    })?;
                if params.iter().any(|p| &p.name == name) {
                    return Err(SchemaError::DuplicateParam(name.clone()));
                }
                params.push(ParamSpec {
                    name: name.clone(),
                    kind,
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    required: required.contains(&name.as_str()),
                });
            }
        }

        if let Some(missing) = required.iter().find(|r| !params.iter().any(|p| p.name == **r)) {
            return Err(SchemaError::UnknownRequired(missing.to_string()));
        }

        Ok(Self { params })
    }

    /// Check an argument map against the declared parameters.
    ///
    /// Reports the first offending parameter in declaration order; unknown
    /// argument names are reported after all declared ones pass.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), ArgumentError> {
        for param in &self.params {
            match arguments.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ArgumentError::new(&param.name, "missing required parameter"));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.kind.accepts(value) => {
                    return Err(ArgumentError::new(
                        &param.name,
                        format!("expected {}, got {}", param.kind, describe(value)),
                    ));
                }
                Some(_) => {}
            }
        }

        if let Some(extra) = arguments.keys().find(|k| self.param(k).is_none()) {
            return Err(ArgumentError::new(extra, "unexpected parameter"));
        }

        Ok(())
    }
}

/// Read an integer argument, accepting integral floats.
pub fn integer_arg(arguments: &Map<String, Value>, name: &str) -> Result<i64, ArgumentError> {
    let value = arguments
        .get(name)
        .ok_or_else(|| ArgumentError::new(name, "missing required parameter"))?;
    as_integer(value)
        .ok_or_else(|| ArgumentError::new(name, format!("expected integer, got {}", describe(value))))
}

fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_schema() -> InputSchema {
        InputSchema::empty()
            .required("a", ParamType::Integer, "First number")
            .required("b", ParamType::Integer, "Second number")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn renders_json_schema_in_declaration_order() {
        let schema = InputSchema::empty()
            .required("zeta", ParamType::String, "")
            .optional("alpha", ParamType::Boolean, "flag")
            .required("mid", ParamType::Number, "");
        let json = schema.to_json();

        let names: Vec<&String> = json["properties"].as_object().unwrap().keys().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(json["required"], json!(["zeta", "mid"]));
        assert_eq!(json["properties"]["alpha"]["description"], "flag");
    }

    #[test]
    fn parses_back_what_it_renders() {
        let schema = InputSchema::empty()
            .required("query", ParamType::String, "Search text")
            .optional("limit", ParamType::Integer, "")
            .required("exact", ParamType::Boolean, "");
        let parsed = InputSchema::from_json(&schema.to_json()).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn empty_schema_parses_from_bare_object() {
        let parsed = InputSchema::from_json(&json!({"type": "object"})).unwrap();
        assert!(parsed.params().is_empty());
    }

    #[test]
    fn rejects_required_name_without_property() {
        let err = InputSchema::from_json(&json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "required": ["a", "b"]
        }))
        .unwrap_err();
        assert_eq!(err, SchemaError::UnknownRequired("b".into()));
    }

    #[test]
    fn rejects_untyped_property() {
        let err = InputSchema::from_json(&json!({
            "type": "object",
            "properties": {"a": {}}
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { name, .. } if name == "a"));
    }

    #[test]
    fn validate_accepts_well_typed_arguments() {
        assert!(pair_schema().validate(&args(json!({"a": 2, "b": -3}))).is_ok());
        assert!(pair_schema().validate(&args(json!({"a": 2.0, "b": 3}))).is_ok());
    }

    #[test]
    fn validate_reports_wrong_type_with_parameter_name() {
        let err = pair_schema()
            .validate(&args(json!({"a": "x", "b": 3})))
            .unwrap_err();
        assert_eq!(err.parameter, "a");
        assert_eq!(err.reason, "expected integer, got string \"x\"");
    }

    #[test]
    fn validate_rejects_fractional_integer() {
        let err = pair_schema()
            .validate(&args(json!({"a": 1, "b": 2.5})))
            .unwrap_err();
        assert_eq!(err.parameter, "b");
    }

    #[test]
    fn validate_reports_missing_and_unexpected() {
        let err = pair_schema().validate(&args(json!({"a": 1}))).unwrap_err();
        assert_eq!(err, ArgumentError::new("b", "missing required parameter"));

        let err = pair_schema()
            .validate(&args(json!({"a": 1, "b": 2, "c": 3})))
            .unwrap_err();
        assert_eq!(err, ArgumentError::new("c", "unexpected parameter"));
    }

    #[test]
    fn optional_parameter_may_be_null_or_absent() {
        let schema = InputSchema::empty().optional("limit", ParamType::Integer, "");
        assert!(schema.validate(&Map::new()).is_ok());
        assert!(schema.validate(&args(json!({"limit": null}))).is_ok());
    }

    #[test]
    fn integer_arg_reads_integral_values() {
        let map = args(json!({"a": 7, "b": 4.0, "c": 1.5}));
        assert_eq!(integer_arg(&map, "a"), Ok(7));
        assert_eq!(integer_arg(&map, "b"), Ok(4));
        assert!(integer_arg(&map, "c").is_err());
        assert!(integer_arg(&map, "missing").is_err());
    }
}
