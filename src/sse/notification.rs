//! Classification of relayed JSON-RPC notifications.

use serde_json::Value;

use crate::bus::Event;
use crate::types::{join_text_items, parse_content_items};

pub const PROGRESS_METHOD: &str = "notifications/progress";
pub const MESSAGE_METHOD: &str = "notifications/message";

/// Text used when a message notification carries no text items.
pub const EMPTY_MESSAGE_TEXT: &str = "(message)";

/// Level assigned to message notifications that omit one.
pub const DEFAULT_LEVEL: &str = "info";

/// A domain notification recognized in an upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Progress {
        progress: f64,
        token: Value,
        user_id: Option<String>,
    },
    Message {
        text: String,
        level: Option<String>,
        user_id: Option<String>,
    },
}

impl Notification {
    /// User id the upstream attached, used to resolve the destination session.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Progress { user_id, .. } | Self::Message { user_id, .. } => user_id.as_deref(),
        }
    }

    /// Convert into the event republished to a session.
    pub fn into_event(self) -> Event {
        match self {
            Self::Progress {
                progress, token, ..
            } => Event::progress(token, progress),
            Self::Message { text, level, .. } => {
                Event::notification_message(text, level.unwrap_or_else(|| DEFAULT_LEVEL.to_string()))
            }
        }
    }
}

/// Classify the joined data of one frame.
///
/// Returns `None` for malformed JSON, unrecognized shapes, and progress
/// notifications whose value is not numeric.
pub fn classify(data: &str) -> Option<Notification> {
    let root: Value = match serde_json::from_str(data) {
        Ok(root) => root,
        Err(error) => {
            tracing::debug!(%error, "dropping malformed frame");
            return None;
        }
    };
    let root = root.as_object()?;

    let method = root.get("method").and_then(Value::as_str);
    let params = root
        .get("params")
        .and_then(Value::as_object)
        .filter(|params| !params.is_empty());
    let user_id = root
        .get("user_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let has_progress = |map: &serde_json::Map<String, Value>| {
        map.contains_key("progress") && map.contains_key("progressToken")
    };

    if method == Some(PROGRESS_METHOD) || has_progress(root) || params.is_some_and(has_progress) {
        let source = params.unwrap_or(root);
        let progress = source.get("progress").and_then(Value::as_f64)?;
        let token = source.get("progressToken").cloned().unwrap_or(Value::Null);
        return Some(Notification::Progress {
            progress,
            token,
            user_id,
        });
    }

    if method == Some(MESSAGE_METHOD) && root.contains_key("params") {
        let items = params
            .and_then(|params| params.get("data"))
            .map(parse_content_items)
            .unwrap_or_default();
        let mut text = join_text_items(&items, " ");
        if text.is_empty() {
            text = EMPTY_MESSAGE_TEXT.to_string();
        }
        let level = params
            .and_then(|params| params.get("level"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Some(Notification::Message {
            text,
            level,
            user_id,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn progress_by_method() {
        let data = json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"progress": 0.25, "progressToken": "t1"},
            "user_id": "alice",
        });
        assert_eq!(
            classify(&data.to_string()),
            Some(Notification::Progress {
                progress: 0.25,
                token: json!("t1"),
                user_id: Some("alice".into()),
            })
        );
    }

    #[test]
    fn progress_at_root_without_method() {
        let data = json!({"progress": 3, "progressToken": 9});
        assert_eq!(
            classify(&data.to_string()),
            Some(Notification::Progress {
                progress: 3.0,
                token: json!(9),
                user_id: None,
            })
        );
    }

    #[test]
    fn non_numeric_progress_is_dropped() {
        let data = json!({"method": "notifications/progress", "params": {"progress": "half", "progressToken": "t"}});
        assert_eq!(classify(&data.to_string()), None);
    }

    #[test]
    fn message_joins_text_items_only() {
        let data = json!({
            "method": "notifications/message",
            "params": {
                "level": "warning",
                "data": [
                    {"type": "text", "text": "hello"},
                    {"type": "image", "url": "x"},
                    {"type": "text", "text": "world"},
                ],
            },
        });
        assert_eq!(
            classify(&data.to_string()),
            Some(Notification::Message {
                text: "hello world".into(),
                level: Some("warning".into()),
                user_id: None,
            })
        );
    }

    #[test]
    fn message_without_text_uses_placeholder_and_default_level() {
        let data = json!({"method": "notifications/message", "params": {}});
        let notification = classify(&data.to_string()).expect("message");
        assert_eq!(notification.user_id(), None);
        let event = notification.into_event();
        assert_eq!(event.data()["params"]["level"], "info");
        assert_eq!(event.data()["params"]["data"][0]["text"], EMPTY_MESSAGE_TEXT);
    }

    #[test]
    fn malformed_and_unrelated_frames_are_ignored() {
        assert_eq!(classify("{not json"), None);
        assert_eq!(classify("[1,2,3]"), None);
        assert_eq!(classify(&json!({"method": "tools/list"}).to_string()), None);
    }
}
