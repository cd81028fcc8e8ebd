//! Typed access to tool call arguments.

use crate::error::RelayError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments. `null` becomes an empty object.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Insert or overwrite one argument. No-op when the arguments are not an object.
    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        if let Some(map) = self.value.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, RelayError> {
        self.get_str_opt(key)
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, RelayError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("integer", key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, RelayError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| missing("number", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, RelayError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing("boolean", key))
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>, RelayError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| missing("array", key))
    }

    /// Deserialize all arguments into a typed struct.
    ///
    /// Arguments that arrive as a JSON-encoded string (as chat backends send
    /// them) are decoded first.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, RelayError> {
        let value = match &self.value {
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
            serde_json::Value::String(raw) => serde_json::from_str(raw.trim()).map_err(|e| {
                RelayError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
            })?,
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            RelayError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

fn missing(kind: &str, key: &str) -> RelayError {
    RelayError::InvalidArgument(format!("Missing {kind} argument: {key}"))
}
