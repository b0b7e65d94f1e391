//! The `get-editing-context` aggregate: four resource reads fanned out at once.

use super::content::parse_resource_text;
use super::rpc::{RpcChannel, RpcError};
use futures::future::join_all;
use serde_json::{json, Map, Value};

pub const EDITING_CONTEXT_OPERATION: &str = "get-editing-context";

pub const EDITING_CONTEXT_DESCRIPTION: &str = "Get complete DaVinci Resolve editing context in one call. \
Returns: current project name, current timeline (name, frame rate, resolution, start timecode), \
all timeline clips (with positions and durations), and media pool clips. \
Call this FIRST before any editing operation to understand the current state.";

/// Output key and resource URI, in output order.
const CONTEXT_RESOURCES: [(&str, &str); 4] = [
    ("current_project", "resolve://current-project"),
    ("current_timeline", "resolve://current-timeline"),
    ("timeline_clips", "resolve://timeline-clips"),
    ("media_pool_clips", "resolve://media-pool-clips"),
];

/// `resources/read` returning the raw `contents` entries.
pub async fn read_resource(channel: &RpcChannel, uri: &str) -> Result<Vec<Value>, RpcError> {
    let result = channel
        .request("resources/read", json!({ "uri": uri }))
        .await?;
    result
        .get("contents")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| RpcError::Protocol("resources/read reply has no \"contents\" array".to_string()))
}

/// Reads every context resource concurrently. A failed read becomes `{"error": ...}`
/// under its key; the aggregate itself never fails.
pub async fn gather(channel: &RpcChannel) -> Value {
    let reads = CONTEXT_RESOURCES
        .iter()
        .map(|(_, uri)| read_resource(channel, uri));
    let results = join_all(reads).await;

    let mut context = Map::new();
    for ((key, uri), result) in CONTEXT_RESOURCES.iter().zip(results) {
        let value = match result {
            Ok(contents) => parse_resource_text(&contents),
            Err(err) => {
                tracing::warn!(uri = %uri, error = %err, "editing context read failed");
                json!({ "error": err.to_string() })
            }
        };
        context.insert(key.to_string(), value);
    }
    Value::Object(context)
}
