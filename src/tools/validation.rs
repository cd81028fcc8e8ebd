//! Top-level argument checks against a tool's declared schema.

use serde_json::Value;

use crate::error::RelayError;

/// Check object shape, required fields, and declared primitive types.
///
/// Nested schemas are not descended into.
pub fn validate_arguments(tool_name: &str, args: &Value, schema: &Value) -> Result<(), RelayError> {
    let invalid = |message: String| RelayError::InvalidArgument(format!("{tool_name}: {message}"));

    let Some(obj) = args.as_object() else {
        return Err(invalid(format!("expected object arguments, got {}", type_name(args))));
    };

    let required = schema.get("required").and_then(Value::as_array);
    for name in required.into_iter().flatten().filter_map(Value::as_str) {
        if !obj.contains_key(name) {
            return Err(invalid(format!("missing required field '{name}'")));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let expected = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str);
        if let Some(expected) = expected {
            if !matches_type(value, expected) {
                return Err(invalid(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    type_name(value)
                )));
            }
        }
    }
    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"soql": {"type": "string"}, "limit": {"type": "integer"}},
            "required": ["soql"],
        })
    }

    #[test]
    fn accepts_matching_arguments() {
        assert!(validate_arguments("q", &json!({"soql": "x", "limit": 3, "extra": true}), &schema()).is_ok());
    }

    #[test]
    fn rejects_missing_and_mistyped_fields() {
        let err = validate_arguments("q", &json!({"limit": 3}), &schema()).unwrap_err();
        assert!(err.to_string().contains("missing required field 'soql'"));
        let err = validate_arguments("q", &json!({"soql": "x", "limit": 1.5}), &schema()).unwrap_err();
        assert!(err.to_string().contains("expected type 'integer'"));
        assert!(validate_arguments("q", &json!([1]), &schema()).is_err());
    }
}
