//! Rendering of child replies into text.

use serde_json::Value;

/// Joins `tools/call` content items; text items verbatim, others as JSON.
pub fn format_tool_content(content: &Value) -> String {
    match content {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                if item.get("type").and_then(Value::as_str) == Some("text") {
                    item.get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                } else {
                    item.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Joins `resources/read` contents; blobs are replaced by a `[blob: <uri>]` marker.
pub fn format_resource_contents(contents: &[Value]) -> String {
    contents
        .iter()
        .map(|entry| {
            if let Some(text) = entry.get("text").and_then(Value::as_str) {
                text.to_string()
            } else if entry.get("blob").is_some() {
                let uri = entry.get("uri").and_then(Value::as_str).unwrap_or_default();
                format!("[blob: {}]", uri)
            } else {
                entry.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenated text of all entries, parsed as JSON when possible.
pub fn parse_resource_text(contents: &[Value]) -> Value {
    let raw: String = contents
        .iter()
        .filter_map(|entry| entry.get("text").and_then(Value::as_str))
        .collect();
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
