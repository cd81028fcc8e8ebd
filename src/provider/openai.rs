//! OpenAI-compatible chat completions, against OpenAI or an Azure deployment.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::types::{AgentToolCall, ContentPart, ModelMessage, Role};
use crate::util::RetryPolicy;

use super::http::{api_key_headers, bearer_headers, build_client, status_to_error};
use super::{ChatBackend, ChatReply, ToolDefinition};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Where completion requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEndpoint {
    /// `{base_url}/chat/completions` with a bearer token.
    OpenAi { base_url: String, model: String },
    /// Azure deployment URL with an `api-key` header.
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl ChatEndpoint {
    fn url(&self) -> String {
        match self {
            Self::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. } => model,
            Self::Azure { deployment, .. } => deployment,
        }
    }
}

pub struct OpenAiChatBackend {
    client: reqwest::Client,
    endpoint: ChatEndpoint,
    api_key: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAiChatBackend {
    pub fn new(endpoint: ChatEndpoint, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            endpoint,
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, messages: &[ModelMessage], tools: &[ToolDefinition]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": messages.iter().map(message_to_openai).collect::<Vec<_>>(),
            "max_tokens": self.max_tokens,
        });
        if let Some(obj) = body.as_object_mut() {
            if let ChatEndpoint::OpenAi { model, .. } = &self.endpoint {
                obj.insert("model".into(), model.clone().into());
            }
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }
        body
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        match self.endpoint {
            ChatEndpoint::OpenAi { .. } => bearer_headers(&self.api_key),
            ChatEndpoint::Azure { .. } => api_key_headers(&self.api_key),
        }
    }

    async fn send_once(&self, url: &str, body: &serde_json::Value) -> Result<OpenAiChatResponse> {
        let resp = self
            .client
            .post(url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp.json().await?)
    }
}

impl std::fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("endpoint", &self.endpoint)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    fn model_id(&self) -> &str {
        self.endpoint.model()
    }

    async fn complete(&self, messages: &[ModelMessage], tools: &[ToolDefinition]) -> Result<ChatReply> {
        let body = self.build_request_body(messages, tools);
        let url = self.endpoint.url();
        debug!(model = self.model_id(), messages = messages.len(), tools = tools.len(), "chat completion");

        let data = self.retry.execute(|| self.send_once(&url, &body)).await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::api(200, "No choices in chat completion response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| AgentToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments)),
            })
            .collect();

        Ok(ChatReply {
            text: choice.message.content,
            tool_calls,
        })
    }
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    let tool_result = msg.content.iter().find_map(|part| match part {
        ContentPart::ToolResult(result) => Some(result),
        _ => None,
    });
    if let Some(result) = tool_result {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        });
    }

    let tool_calls = msg.tool_calls();
    if msg.role == Role::Assistant && !tool_calls.is_empty() {
        let tc_json: Vec<serde_json::Value> = tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": match &tc.arguments {
                            serde_json::Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    }
                })
            })
            .collect();
        let text = msg.text();
        return serde_json::json!({
            "role": "assistant",
            "content": if text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(text) },
            "tool_calls": tc_json,
        });
    }

    serde_json::json!({ "role": msg.role.as_ref(), "content": msg.text() })
}

// Response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}
