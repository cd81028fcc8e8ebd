//! Typed content items carried by tool results, notifications and thread
//! messages.

use serde::{Deserialize, Serialize};

/// One item of a `content` array.
///
/// Unknown item types deserialize to [`ContentItem::Unknown`] and are skipped
/// by the text conversions below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    Data { data: serde_json::Value },
    #[serde(other)]
    Unknown,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Human-readable text for this item, if it has any.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text { text } => Some(text.clone()),
            Self::Data { data } => match data {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
            Self::Unknown => {
                tracing::debug!("skipping content item of unknown type");
                None
            }
        }
    }
}

/// Parse a JSON array of content items, skipping entries that are not objects.
pub fn parse_content_items(value: &serde_json::Value) -> Vec<ContentItem> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<ContentItem>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Join the text-typed items only, the way notification messages are rendered.
pub fn join_text_items(items: &[ContentItem], separator: &str) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text { text } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Aggregate all convertible items into one trimmed block of text.
pub fn collect_text(items: &[ContentItem]) -> String {
    items
        .iter()
        .filter_map(ContentItem::as_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
