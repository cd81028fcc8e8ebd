//! Events delivered to subscribed clients.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// JSON-RPC version tag used in relayed notifications.
pub const JSONRPC_VERSION: &str = "2.0";

/// Event type tag, rendered as the SSE `event:` field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Open,
    Progress,
    Message,
    Heartbeat,
    #[serde(rename = "noevent")]
    #[strum(serialize = "noevent")]
    NoEvent,
    Error,
}

/// An immutable, self-describing unit queued for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    kind: EventKind,
    data: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Stream-open marker sent first on every subscription.
    pub fn open() -> Self {
        Self::new(EventKind::Open, json!({}))
    }

    /// Keep-alive frame of the given kind (`heartbeat` or `noevent`).
    pub fn keepalive(kind: EventKind) -> Self {
        Self::new(kind, json!({}))
    }

    /// Progress notification for a correlation token.
    pub fn progress(token: serde_json::Value, progress: f64) -> Self {
        Self::new(
            EventKind::Progress,
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": "notifications/progress",
                "params": {
                    "progressToken": token,
                    "progress": progress,
                },
            }),
        )
    }

    /// Log-style message notification carrying a single text item.
    pub fn notification_message(text: impl Into<String>, level: impl Into<String>) -> Self {
        Self::new(
            EventKind::Message,
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": "notifications/message",
                "params": {
                    "level": level.into(),
                    "data": [{ "type": "text", "text": text.into() }],
                },
            }),
        )
    }

    /// Final assistant answer of a run.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(EventKind::Message, json!({ "text": text.into() }))
    }

    /// Terminal error of a run.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, json!({ "error": message.into() }))
    }

    /// Render as an SSE frame: `event: <kind>\ndata: <json>\n\n`.
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.data)
    }
}
