//! Process-wide relay state, constructed once and shared by reference.

use std::sync::Arc;

use crate::agent_loop::{AgentRunBackend, ApprovalRunner, ChatLoop, ConversationStore};
use crate::bus::{normalize_session_key, Session, SessionBus, UserSessions};
use crate::config::RelayConfig;
use crate::protocol::{DispatchOutcome, LocalToolBackend, ProtocolDispatcher, RpcRequest, ServerInfo, ToolBackend};
use crate::provider::ChatBackend;
use crate::sse::{event_stream, StreamRelay};
use crate::tools::ToolRegistry;

/// Owns the bus, the user map, conversation history, and the tool registry.
///
/// Independent contexts share nothing, so tests can run several side by side.
#[derive(Debug, Clone)]
pub struct RelayContext {
    config: RelayConfig,
    bus: Arc<SessionBus>,
    users: Arc<UserSessions>,
    history: Arc<ConversationStore>,
    registry: Arc<ToolRegistry>,
}

impl RelayContext {
    pub fn new(config: RelayConfig, registry: ToolRegistry) -> Self {
        Self {
            config,
            bus: Arc::new(SessionBus::new()),
            users: Arc::new(UserSessions::new()),
            history: Arc::new(ConversationStore::new()),
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<SessionBus> {
        &self.bus
    }

    pub fn users(&self) -> &Arc<UserSessions> {
        &self.users
    }

    pub fn history(&self) -> &Arc<ConversationStore> {
        &self.history
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> ProtocolDispatcher {
        ProtocolDispatcher::new(self.registry.clone(), self.bus.clone()).with_server_info(ServerInfo {
            name: self.config.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Normalize the session header and dispatch one control request.
    pub async fn handle_control(&self, session_header: Option<&str>, request: RpcRequest) -> (String, DispatchOutcome) {
        let session = normalize_session_key(session_header);
        let outcome = self.dispatcher().dispatch(&session, request).await;
        (session, outcome)
    }

    /// Open a subscription: frames for the session until it is closed.
    pub fn subscribe(&self, session_header: Option<&str>) -> (Arc<Session>, impl futures::Stream<Item = String>) {
        let session = self.bus.get_or_create(&normalize_session_key(session_header));
        let stream = event_stream(session.clone(), self.config.delivery);
        (session, stream)
    }

    /// Tear down a session and its histories. Returns whether the session existed.
    pub fn close_session(&self, session_header: Option<&str>) -> bool {
        let key = normalize_session_key(session_header);
        self.history.clear_session(&key);
        self.bus.delete(&key)
    }

    /// Tool backend that calls this context's registry in-process.
    pub fn local_tools(&self, session: &str) -> LocalToolBackend {
        LocalToolBackend::new(self.dispatcher(), session)
    }

    /// Relay for an upstream event endpoint, wired to this context's bus.
    pub fn stream_relay(&self, endpoint: impl Into<String>, session_id: impl Into<String>) -> crate::error::Result<StreamRelay> {
        Ok(StreamRelay::new(endpoint, session_id, self.bus.clone(), self.users.clone())?
            .with_backoff(self.config.backoff))
    }

    pub fn chat_loop(&self, chat: Arc<dyn ChatBackend>, tools: Arc<dyn ToolBackend>) -> ChatLoop {
        ChatLoop::new(chat, tools, self.history.clone(), self.users.clone(), self.bus.clone())
            .with_system_prompt(self.config.system_prompt.clone())
            .with_max_iterations(self.config.max_tool_iterations)
    }

    pub fn approval_runner(&self, backend: Arc<dyn AgentRunBackend>) -> ApprovalRunner {
        ApprovalRunner::new(backend, self.bus.clone()).with_poll_policy(self.config.poll)
    }
}
