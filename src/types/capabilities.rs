//! Declared provider capabilities and model handles.

use serde::{Deserialize, Serialize};

/// Features a provider adapter advertises. The client checks `streaming`
/// before building any per-call state; the rest are preflight hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub json_mode: bool,
    pub tools: bool,
    pub batch: bool,
    pub vision: bool,
    pub audio: bool,
}

impl ProviderCapabilities {
    pub const fn new() -> Self {
        Self {
            streaming: false,
            json_mode: false,
            tools: false,
            batch: false,
            vision: false,
            audio: false,
        }
    }

    pub const fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub const fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub const fn with_tools(mut self) -> Self {
        self.tools = true;
        self
    }

    pub const fn with_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    pub const fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    pub const fn with_audio(mut self) -> Self {
        self.audio = true;
        self
    }
}

/// Prompting style of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Chat,
    Instruct,
    Json,
}

/// Opaque model handle produced by an adapter's `create_model` factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderModel {
    pub id: String,
    pub format: ModelFormat,
    pub max_input_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl ProviderModel {
    /// A chat-format model with no token hints.
    pub fn chat(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            format: ModelFormat::Chat,
            max_input_tokens: None,
            max_output_tokens: None,
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_token_limits(mut self, max_input: Option<u32>, max_output: Option<u32>) -> Self {
        self.max_input_tokens = max_input;
        self.max_output_tokens = max_output;
        self
    }
}
