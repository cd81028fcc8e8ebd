//! Iterative chat/tool-call loop with per (session, user) history.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::history::ConversationStore;
use crate::bus::{Event, SessionBus, UserSessions};
use crate::error::Result;
use crate::protocol::ToolBackend;
use crate::provider::{ChatBackend, ToolDefinition};
use crate::sse::StreamRelay;
use crate::types::{collect_text, parse_content_items, AgentToolCall, ModelMessage};

/// Upper bound on model/tool round-trips per turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 16;

/// Result of one chat turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatTurn {
    /// Assistant text produced by the turn (at most one entry today). Empty
    /// when the turn is exhausted.
    pub texts: Vec<String>,
    /// Loop iterations used.
    pub iterations: usize,
    /// The iteration bound was hit while the model still requested tools.
    pub exhausted: bool,
}

impl ChatTurn {
    pub fn text(&self) -> String {
        self.texts.join("\n")
    }
}

/// Drives one conversational turn against a chat backend and a tool backend.
pub struct ChatLoop {
    chat: Arc<dyn ChatBackend>,
    tools: Arc<dyn ToolBackend>,
    history: Arc<ConversationStore>,
    users: Arc<UserSessions>,
    bus: Arc<SessionBus>,
    relay: Option<Arc<StreamRelay>>,
    system_prompt: String,
    max_iterations: usize,
}

impl ChatLoop {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        tools: Arc<dyn ToolBackend>,
        history: Arc<ConversationStore>,
        users: Arc<UserSessions>,
        bus: Arc<SessionBus>,
    ) -> Self {
        Self {
            chat,
            tools,
            history,
            users,
            bus,
            relay: None,
            system_prompt: String::new(),
            max_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    /// System prompt; `{user_id}` is replaced with the caller's id.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Relay whose broadcast session follows the most recent turn.
    pub fn with_relay(mut self, relay: Arc<StreamRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub async fn handle_query(&self, session: &str, user: &str, query: &str) -> Result<ChatTurn> {
        self.users.associate(user, session);
        if let Some(relay) = &self.relay {
            relay.set_broadcast_session(session);
        }

        let descriptors = self.tools.list_tools().await?;
        let known: HashSet<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let tool_defs: Vec<ToolDefinition> = descriptors.into_iter().map(ToolDefinition::from).collect();
        tracing::debug!(session, user, tools = tool_defs.len(), "starting chat turn");

        let mut messages = Vec::new();
        messages.push(ModelMessage::system(self.system_prompt.replace("{user_id}", user)));
        messages.extend(self.history.history(session, user));
        messages.push(ModelMessage::user(query));

        let first = self.chat.complete(&messages, &tool_defs).await;
        self.history.append(session, user, ModelMessage::user(query));
        let mut reply = first?;

        let mut turn = ChatTurn::default();
        while turn.iterations < self.max_iterations {
            turn.iterations += 1;

            let Some(call) = reply.tool_calls.first().cloned() else {
                self.record_text(session, user, reply.non_empty_text(), &mut turn);
                return Ok(self.finish(session, turn));
            };
            if reply.tool_calls.len() > 1 {
                tracing::debug!(session, requested = reply.tool_calls.len(), "only the first tool call is executed");
            }
            if !known.contains(&call.name) {
                tracing::warn!(session, tool = %call.name, "model requested an unavailable tool");
                self.record_text(session, user, reply.non_empty_text(), &mut turn);
                return Ok(self.finish(session, turn));
            }

            let output = self.execute(session, &call).await;
            messages.push(ModelMessage::assistant_tool_call(call.clone()));
            messages.push(ModelMessage::tool_result(call.id, output));

            reply = self.chat.complete(&messages, &tool_defs).await?;
        }

        tracing::warn!(session, iterations = turn.iterations, "tool iteration limit reached");
        turn.exhausted = true;
        Ok(self.finish(session, turn))
    }

    fn record_text(&self, session: &str, user: &str, text: Option<&str>, turn: &mut ChatTurn) {
        if let Some(text) = text {
            turn.texts.push(text.to_string());
            self.history.append(session, user, ModelMessage::assistant(text));
        }
    }

    fn finish(&self, session: &str, turn: ChatTurn) -> ChatTurn {
        if !turn.texts.is_empty() {
            self.bus.publish(session, Event::assistant_text(turn.text()));
        }
        tracing::info!(session, iterations = turn.iterations, exhausted = turn.exhausted, "chat turn finished");
        turn
    }

    /// Run one tool call; failures become the tool result text.
    async fn execute(&self, session: &str, call: &AgentToolCall) -> String {
        let arguments = match &call.arguments {
            Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
            Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| call.arguments.clone()),
            other => other.clone(),
        };
        tracing::info!(session, tool = %call.name, "calling tool");
        match self.tools.call_tool(&call.name, arguments).await {
            Ok(result) => tool_result_text(&result),
            Err(error) => {
                tracing::warn!(session, tool = %call.name, %error, "tool call failed");
                format!("Error: {error}")
            }
        }
    }
}

impl std::fmt::Debug for ChatLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatLoop")
            .field("model", &self.chat.model_id())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Text fed back to the model for a call-tool result.
pub fn tool_result_text(result: &Value) -> String {
    if let Some(content) = result.get("content") {
        let text = collect_text(&parse_content_items(content));
        if !text.is_empty() {
            return text;
        }
    }
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_text_prefers_content_items() {
        let result = json!({"content": [{"type": "text", "text": "2 rows"}, {"type": "data", "data": {"n": 2}}]});
        assert_eq!(tool_result_text(&result), "2 rows\n{\"n\":2}");
        assert_eq!(tool_result_text(&json!({"content": []})), "{\"content\":[]}");
        assert_eq!(tool_result_text(&json!("raw")), "raw");
    }
}
