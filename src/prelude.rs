//! Convenience re-exports for common use.

pub use crate::agent_loop::{AgentRunBackend, ApprovalRunner, ChatLoop, ChatTurn, RunOutcome, RunStatus};
pub use crate::bus::{normalize_session_key, Event, EventKind, SessionBus, UserSessions};
pub use crate::config::RelayConfig;
pub use crate::context::RelayContext;
pub use crate::error::{RelayError, Result};
pub use crate::protocol::{ControlClient, DispatchOutcome, ProtocolDispatcher, RpcRequest, RpcResponse, ToolBackend};
pub use crate::provider::{ChatBackend, ChatReply, ToolDefinition};
pub use crate::sse::{event_stream, DeliveryConfig, StreamRelay};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolExecutionContext, ToolParameters, ToolRegistry};
pub use crate::types::{ContentItem, ModelMessage, Role};

#[cfg(feature = "openai")]
pub use crate::provider::{ChatEndpoint, OpenAiChatBackend};
