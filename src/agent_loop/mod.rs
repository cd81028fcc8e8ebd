//! Run orchestration: the streaming approval flow and the iterative
//! chat/tool-call flow.

pub mod approval;
pub mod chat;
pub mod history;
pub mod types;

pub use approval::{
    select_latest_assistant, AgentRunBackend, ApprovalRunner, RequiredAction, RequiredToolCall,
    RunStreamEvent, ThreadMessage, ToolApproval, NO_ASSISTANT_TEXT,
};
pub use chat::{tool_result_text, ChatLoop, ChatTurn, DEFAULT_MAX_TOOL_ITERATIONS};
pub use history::ConversationStore;
pub use types::{RunId, RunOutcome, RunState, RunStatus};
