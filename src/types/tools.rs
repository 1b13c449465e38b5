//! Tool calling and function definition types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model, as recorded in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id echoed by the matching `tool` message
    pub id: String,
    /// Tool name
    pub name: String,
    /// Parsed arguments (always a JSON object once recorded)
    #[serde(default = "empty_object")]
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Tool definition for function calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool type (usually "function")
    #[serde(default = "function_type")]
    pub r#type: String,
    /// Function definition
    pub function: ToolFunction,
}

fn function_type() -> String {
    "function".to_string()
}

impl Tool {
    /// Create a new function tool
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            r#type: function_type(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Whether the declared schema accepts any argument at all.
    ///
    /// `null`, `{}` and object schemas without properties count as empty.
    pub fn has_parameters(&self) -> bool {
        match &self.function.parameters {
            Value::Null => false,
            Value::Object(schema) => match schema.get("properties") {
                Some(Value::Object(props)) => !props.is_empty(),
                Some(_) => true,
                None => schema
                    .keys()
                    .any(|k| k != "type" && k != "additionalProperties" && k != "required"),
            },
            _ => true,
        }
    }

    /// Parameter schema, normalized to an object schema for providers that require one.
    pub fn parameters_schema(&self) -> Value {
        match &self.function.parameters {
            Value::Object(schema) if !schema.is_empty() => self.function.parameters.clone(),
            _ => serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

/// Tool function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(default)]
    pub description: String,
    /// JSON schema for function parameters
    #[serde(default)]
    pub parameters: Value,
}
