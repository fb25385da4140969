//! Tool calling definitions.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declaration of a callable tool: name, description, and a JSON-schema-like
/// parameter descriptor (typically `type`, `properties`, `required`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Property names listed under `parameters.required`, deduplicated once
    /// per distinct name (schemas in the wild repeat entries).
    pub fn required_properties(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        if let Some(Value::Array(names)) = self.parameters.get("required") {
            for name in names.iter().filter_map(Value::as_str) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }
}

/// Ordered sequence of tool definitions with case-sensitively unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCollection {
    tools: Vec<ToolDefinition>,
}

impl ToolCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition, rejecting empty and duplicate names.
    pub fn push(&mut self, tool: ToolDefinition) -> Result<()> {
        if tool.name.is_empty() {
            return Err(Error::validation("tool definition requires a non-empty name"));
        }
        if self.get(&tool.name).is_some() {
            return Err(Error::validation(format!(
                "duplicate tool name '{}' in tool collection",
                tool.name
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Case-sensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl TryFrom<Vec<ToolDefinition>> for ToolCollection {
    type Error = Error;

    fn try_from(tools: Vec<ToolDefinition>) -> Result<Self> {
        let mut collection = Self::new();
        for tool in tools {
            collection.push(tool)?;
        }
        Ok(collection)
    }
}

/// A tool invocation emitted by the model. `arguments_json` is the raw JSON
/// string exactly as the provider produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments_json: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments_json: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(required: Value) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("type".into(), json!("object"));
        m.insert("required".into(), required);
        m
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut tools = ToolCollection::new();
        tools.push(ToolDefinition::new("weather", "forecast")).unwrap();
        let err = tools
            .push(ToolDefinition::new("weather", "other"))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut tools = ToolCollection::new();
        tools.push(ToolDefinition::new("Weather", "forecast")).unwrap();
        assert!(tools.get("Weather").is_some());
        assert!(tools.get("weather").is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut tools = ToolCollection::new();
        assert!(tools.push(ToolDefinition::new("", "noop")).is_err());
    }

    #[test]
    fn required_properties_dedup_preserves_order() {
        let def = ToolDefinition::new("t", "")
            .with_parameters(params(json!(["city", "unit", "city"])));
        assert_eq!(def.required_properties(), vec!["city", "unit"]);
    }
}
