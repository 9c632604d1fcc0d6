//! Tool definitions and their JSON Schema parameters.

use serde::{Deserialize, Serialize};

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// Builder for object schemas whose properties are all strings.
#[derive(Debug, Default)]
pub struct ObjectSchema {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required string property.
    pub fn required(self, name: &str, description: &str) -> Self {
        self.property(name, description, true)
    }

    /// Add an optional string property.
    pub fn optional(self, name: &str, description: &str) -> Self {
        self.property(name, description, false)
    }

    fn property(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({ "type": "string", "description": description }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn build(self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}
