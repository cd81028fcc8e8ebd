//! Chat-completion backends driving the iterative tool-call loop.

pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{ChatEndpoint, OpenAiChatBackend};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::tools::ToolDescriptor;
use crate::types::{AgentToolCall, ModelMessage};

/// Function tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<ToolDescriptor> for ToolDefinition {
    fn from(descriptor: ToolDescriptor) -> Self {
        Self {
            name: descriptor.name,
            description: descriptor.description,
            parameters: descriptor.input_schema,
        }
    }
}

/// One model reply: optional text plus any requested tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: Option<String>,
    pub tool_calls: Vec<AgentToolCall>,
}

impl ChatReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(call: AgentToolCall) -> Self {
        Self {
            text: None,
            tool_calls: vec![call],
        }
    }

    /// Reply text, treating an empty string as absent.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Single-shot chat completion with tool schema.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Identifier of the model or deployment.
    fn model_id(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ModelMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatReply, RelayError>;
}
