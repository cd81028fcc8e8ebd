//! Session isolation, teardown, and control dispatch through a RelayContext.

use std::time::Duration;

use agent_relay::bus::{normalize_session_key, Event, EventKind};
use agent_relay::config::RelayConfig;
use agent_relay::protocol::{DispatchOutcome, RpcRequest, ToolBackend};
use agent_relay::sse::DeliveryConfig;
use agent_relay::tools::{FnTool, ToolParameters, ToolRegistry};
use agent_relay::types::ModelMessage;
use agent_relay::RelayContext;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

fn context() -> RelayContext {
    let whoami = FnTool::new(
        "whoami",
        "Report the calling session",
        ToolParameters::object().string("session_id", "", true).build(),
        |args, _| async move { Ok(json!(format!("session={}", args.get_str("session_id")?))) },
    )
    .with_session_id();
    let add = FnTool::new(
        "add",
        "Add two integers",
        ToolParameters::object()
            .integer("a", "left operand", true)
            .integer("b", "right operand", true)
            .build(),
        |args, _| async move { Ok(json!(args.get_i64("a")? + args.get_i64("b")?)) },
    );
    let registry = ToolRegistry::builder().tool(whoami).tool(add).build().expect("registry");

    let mut config = RelayConfig::default();
    config.delivery = DeliveryConfig {
        heartbeat: Duration::from_millis(50),
        keepalive: EventKind::Heartbeat,
    };
    RelayContext::new(config, registry)
}

#[test]
fn session_keys_normalize_to_first_token() {
    assert_eq!(normalize_session_key(Some("abc123, extra")), "abc123");
    assert_eq!(normalize_session_key(Some("  abc123  ")), "abc123");
    assert_eq!(normalize_session_key(Some("")), "default");
    assert_eq!(normalize_session_key(None), "default");
}

#[test]
fn sessions_are_isolated() {
    let ctx = context();
    let a = ctx.bus().get_or_create("a");
    let b = ctx.bus().get_or_create("b");

    ctx.bus().publish("a", Event::assistant_text("for a"));
    assert_eq!(b.try_next(), None);
    assert_eq!(a.try_next(), Some(Event::assistant_text("for a")));
}

#[test]
fn close_session_drops_queue_and_history() {
    let ctx = context();
    ctx.bus().publish("abc123", Event::assistant_text("stale"));
    ctx.history().append("abc123", "alice", ModelMessage::user("hi"));
    ctx.history().append("other", "alice", ModelMessage::user("hello"));

    assert!(ctx.close_session(Some("abc123, extra")));
    assert!(!ctx.close_session(Some("abc123")));
    assert_eq!(ctx.history().len("abc123", "alice"), 0);
    assert_eq!(ctx.history().len("other", "alice"), 1);

    let fresh = ctx.bus().get_or_create("abc123");
    assert_eq!(fresh.try_next(), None);
}

#[tokio::test]
async fn subscription_delivers_published_events_in_order() {
    let ctx = context();
    let (session, frames) = ctx.subscribe(Some("s1"));
    futures::pin_mut!(frames);

    assert_eq!(frames.next().await.as_deref(), Some("event: open\ndata: {}\n\n"));

    ctx.bus().publish("s1", Event::assistant_text("one"));
    ctx.bus().publish("s1", Event::error("two"));
    assert_eq!(frames.next().await, Some(Event::assistant_text("one").to_frame()));
    assert_eq!(frames.next().await, Some(Event::error("two").to_frame()));

    assert_eq!(frames.next().await, Some(Event::keepalive(EventKind::Heartbeat).to_frame()));

    session.close();
    let rest: Vec<String> = frames.collect().await;
    assert!(rest.iter().all(|frame| frame.starts_with("event: heartbeat")));
}

#[tokio::test]
async fn control_requests_use_normalized_session() {
    let ctx = context();
    let request = RpcRequest::new(
        "tools/call",
        Some(json!(7)),
        Some(json!({ "name": "whoami", "arguments": {} })),
    );
    let (session, outcome) = ctx.handle_control(Some("abc123, extra"), request).await;
    assert_eq!(session, "abc123");
    assert!(ctx.bus().exists("abc123"));

    let response = outcome.into_response().expect("reply");
    assert_eq!(response.id, json!(7));
    assert_eq!(
        response.result,
        Some(json!({ "content": [{ "type": "text", "text": "session=abc123" }] }))
    );
}

#[tokio::test]
async fn notifications_are_accepted_without_reply() {
    let ctx = context();
    let request = RpcRequest::new("notifications/initialized", None, None);
    let (_, outcome) = ctx.handle_control(None, request).await;
    assert_eq!(outcome, DispatchOutcome::Accepted);
}

#[tokio::test]
async fn unknown_methods_with_id_return_method_not_found() {
    let ctx = context();
    let request = RpcRequest::new("resources/list", Some(json!("r1")), None);
    let (_, outcome) = ctx.handle_control(None, request).await;
    let error = outcome.into_response().and_then(|r| r.error).expect("error");
    assert_eq!(error.code, -32601);
}

#[tokio::test]
async fn local_tool_backend_hides_session_argument() {
    let ctx = context();
    let tools = ctx.local_tools("s9");

    let descriptors = tools.list_tools().await.expect("tools");
    let whoami = descriptors.iter().find(|d| d.name == "whoami").expect("whoami");
    assert!(whoami.input_schema["properties"].get("session_id").is_none());

    let result = tools.call_tool("add", json!({ "a": 2, "b": 3 })).await.expect("call");
    assert_eq!(result, json!({ "content": [{ "type": "text", "text": "5" }] }));

    let invalid = tools.call_tool("add", json!({ "a": "two" })).await.expect("call");
    assert_eq!(invalid["isError"], json!(true));
}
