//! Tool descriptor extraction for vendor payloads.

use crate::types::ToolCollection;
use serde_json::{json, Value};

/// Build the `tools` array shared by the OpenAI-style and Ollama wire
/// formats: `{type: "function", function: {name, description, parameters}}`.
pub fn tools_payload(tools: &ToolCollection) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|def| {
                json!({
                    "type": "function",
                    "function": {
                        "name": def.name,
                        "description": def.description,
                        "parameters": Value::Object(def.parameters.clone()),
                    },
                })
            })
            .collect(),
    )
}
