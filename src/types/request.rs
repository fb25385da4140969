//! Chat request shape and sampling options.

use crate::types::message::Message;
use crate::types::tool::ToolCollection;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// A chat request. Treated as logically immutable past the client entry
/// point; middlewares that need to change it materialize a modified copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCollection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Adapter- and cache-specific passthrough flags. Stripped by request
    /// normalization so hints never affect the request hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_hints: Option<Map<String, Value>>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolCollection) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provider_hints
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn hint(&self, key: &str) -> Option<&Value> {
        self.provider_hints.as_ref().and_then(|h| h.get(key))
    }

    pub fn wants_json(&self) -> bool {
        self.response_format == Some(ResponseFormat::JsonObject)
    }

    /// Range checks for the sampling knobs. An empty message list is allowed
    /// here; whether it is acceptable is the adapter's decision.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::validation(format!(
                    "temperature {} is outside the accepted range 0.0..=2.0",
                    t
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::validation(format!(
                    "top_p {} is outside the accepted range 0.0..=1.0",
                    p
                )));
            }
        }
        if self.max_output_tokens == Some(0) {
            return Err(Error::validation("max_output_tokens must be positive"));
        }
        Ok(())
    }
}
