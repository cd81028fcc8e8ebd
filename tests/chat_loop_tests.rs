//! Chat/tool-call loop with a scripted model and in-process tools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_relay::bus::Event;
use agent_relay::config::RelayConfig;
use agent_relay::error::{RelayError, Result};
use agent_relay::provider::{ChatBackend, ChatReply, ToolDefinition};
use agent_relay::tools::{FnTool, ToolParameters, ToolRegistry};
use agent_relay::types::{AgentToolCall, ContentPart, ModelMessage, Role};
use agent_relay::RelayContext;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Replies with a tool call until `text_on_call`, then with text.
struct ScriptedChat {
    text_on_call: Option<usize>,
    tool: &'static str,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ModelMessage>>>,
    fail: bool,
    /// Text sent alongside every tool call.
    narration: &'static str,
}

impl ScriptedChat {
    fn build(text_on_call: Option<usize>, tool: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            text_on_call,
            tool,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail,
            narration: "",
        })
    }

    fn narrating(tool: &'static str, narration: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text_on_call: None,
            tool,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail: false,
            narration,
        })
    }

    fn new(text_on_call: Option<usize>, tool: &'static str) -> Arc<Self> {
        Self::build(text_on_call, tool, false)
    }

    fn failing() -> Arc<Self> {
        Self::build(None, "count", true)
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ModelMessage], tools: &[ToolDefinition]) -> Result<ChatReply> {
        if self.fail {
            return Err(RelayError::api(500, "model unavailable"));
        }
        assert_eq!(tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["count"]);
        self.seen.lock().unwrap().push(messages.to_vec());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.text_on_call == Some(call) {
            return Ok(ChatReply::text(format!("answer after {call} calls")));
        }
        Ok(ChatReply {
            text: Some(self.narration.to_string()),
            tool_calls: vec![
                AgentToolCall {
                    id: format!("call-{call}"),
                    name: self.tool.to_string(),
                    arguments: json!("{\"table\": \"orders\"}"),
                },
                AgentToolCall {
                    id: format!("ignored-{call}"),
                    name: self.tool.to_string(),
                    arguments: json!({}),
                },
            ],
        })
    }
}

fn context(executions: Arc<AtomicUsize>) -> RelayContext {
    let count = FnTool::new(
        "count",
        "Count rows in a table",
        ToolParameters::object().string("table", "table name", true).build(),
        move |args, _| {
            let executions = executions.clone();
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(json!(format!("{} has 42 rows", args.get_str("table")?)))
            }
        },
    );
    let registry = ToolRegistry::builder().tool(count).build().expect("registry");
    let mut config = RelayConfig::default();
    config.system_prompt = "Assist user {user_id}.".into();
    RelayContext::new(config, registry)
}

#[tokio::test]
async fn terminates_on_sixteenth_turn_with_text() {
    let executions = Arc::new(AtomicUsize::new(0));
    let ctx = context(executions.clone());
    let chat = ScriptedChat::new(Some(16), "count");
    let chat_loop = ctx.chat_loop(chat.clone(), Arc::new(ctx.local_tools("s1")));

    let turn = chat_loop.handle_query("s1", "alice", "how many orders?").await.expect("turn");
    assert_eq!(turn.iterations, 16);
    assert!(!turn.exhausted);
    assert_eq!(turn.text(), "answer after 16 calls");
    assert_eq!(executions.load(Ordering::SeqCst), 15);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 16);

    // Only the first requested call is executed and fed back each round.
    let last = chat.seen.lock().unwrap().last().cloned().unwrap_or_default();
    let tool_results: Vec<String> = last
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| m.content.iter())
        .filter_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result.content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(tool_results.len(), 15);
    assert!(tool_results.iter().all(|t| t == "orders has 42 rows"));

    assert_eq!(
        ctx.bus().get_or_create("s1").try_next(),
        Some(Event::assistant_text("answer after 16 calls"))
    );
    assert_eq!(ctx.users().session_for("alice").as_deref(), Some("s1"));
}

#[tokio::test]
async fn stops_after_sixteen_iterations_when_tools_never_end() {
    let executions = Arc::new(AtomicUsize::new(0));
    let ctx = context(executions.clone());
    let chat = ScriptedChat::new(None, "count");
    let chat_loop = ctx.chat_loop(chat.clone(), Arc::new(ctx.local_tools("s1")));

    let turn = chat_loop.handle_query("s1", "alice", "loop forever").await.expect("turn");
    assert_eq!(turn.iterations, 16);
    assert!(turn.exhausted);
    assert!(turn.texts.is_empty());
    assert_eq!(executions.load(Ordering::SeqCst), 16);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 17);
    assert_eq!(ctx.bus().get_or_create("s1").try_next(), None);
}

#[tokio::test]
async fn exhausted_turn_ignores_text_of_the_unexamined_reply() {
    let ctx = context(Arc::new(AtomicUsize::new(0)));
    let chat = ScriptedChat::narrating("count", "checking another table");
    let chat_loop = ctx.chat_loop(chat.clone(), Arc::new(ctx.local_tools("s1")));

    let turn = chat_loop.handle_query("s1", "alice", "keep counting").await.expect("turn");
    assert!(turn.exhausted);
    assert_eq!(turn.text(), "");
    assert_eq!(chat.calls.load(Ordering::SeqCst), 17);
    assert_eq!(ctx.bus().get_or_create("s1").try_next(), None);
    assert_eq!(ctx.history().len("s1", "alice"), 1);
}

#[tokio::test]
async fn unknown_tool_ends_the_turn() {
    let executions = Arc::new(AtomicUsize::new(0));
    let ctx = context(executions.clone());
    let chat = ScriptedChat::new(None, "drop_table");
    let chat_loop = ctx.chat_loop(chat.clone(), Arc::new(ctx.local_tools("s1")));

    let turn = chat_loop.handle_query("s1", "alice", "drop it").await.expect("turn");
    assert_eq!(turn.iterations, 1);
    assert!(!turn.exhausted);
    assert_eq!(executions.load(Ordering::SeqCst), 0);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn history_is_kept_per_session_and_user() {
    let ctx = context(Arc::new(AtomicUsize::new(0)));
    let chat = ScriptedChat::new(Some(1), "count");
    let chat_loop = ctx.chat_loop(chat.clone(), Arc::new(ctx.local_tools("s1")));

    chat_loop.handle_query("s1", "alice", "first question").await.expect("turn");
    chat.calls.store(0, Ordering::SeqCst);
    chat_loop.handle_query("s1", "alice", "second question").await.expect("turn");

    let seen = chat.seen.lock().unwrap().clone();
    let second = &seen[1];
    assert_eq!(second[0].role, Role::System);
    assert_eq!(second[0].text(), "Assist user alice.");
    let texts: Vec<String> = second[1..].iter().map(|m| m.text()).collect();
    assert_eq!(
        texts,
        vec!["first question", "answer after 1 calls", "second question"]
    );
    assert_eq!(ctx.history().len("s1", "alice"), 4);
    assert_eq!(ctx.history().len("s1", "bob"), 0);
}

#[tokio::test]
async fn model_failure_propagates_but_keeps_the_question() {
    let ctx = context(Arc::new(AtomicUsize::new(0)));
    let chat_loop = ctx.chat_loop(ScriptedChat::failing(), Arc::new(ctx.local_tools("s1")));

    let err = chat_loop.handle_query("s1", "alice", "anyone there?").await.unwrap_err();
    assert!(matches!(err, RelayError::Api { status: 500, .. }));
    let history = ctx.history().history("s1", "alice");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text(), "anyone there?");
}
