use super::ExecutionResult;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Typed view of the state document printed by the introspection script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateSnapshot {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub all_timelines: Vec<String>,
    #[serde(default)]
    pub timeline: Option<TimelineInfo>,
    #[serde(default)]
    pub timeline_clips: Vec<TimelineClip>,
    /// Marker descriptors keyed by frame number.
    #[serde(default)]
    pub markers: BTreeMap<String, Value>,
    #[serde(default)]
    pub media_pool: Vec<MediaPoolClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimelineInfo {
    pub name: Option<String>,
    pub fps: Option<f64>,
    pub start_frame: Option<i64>,
    pub end_frame: Option<i64>,
    pub duration_frames: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub start_timecode: Option<String>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub video_tracks: u32,
    #[serde(default)]
    pub audio_tracks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resolution {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimelineClip {
    pub name: Option<String>,
    pub track: Option<u32>,
    pub start_frame: Option<i64>,
    pub end_frame: Option<i64>,
    pub duration_frames: Option<i64>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaPoolClip {
    pub name: Option<String>,
    pub bin: Option<String>,
    pub file_path: Option<String>,
    pub duration: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot failed: {error}")]
    Remote { error: String, stdout: String },

    #[error("snapshot is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Remote { error, stdout } => {
                let mut app = AppError::new(ErrorCategory::ExecutionFailure, error)
                    .with_code("RB-SNAP-001");
                if !stdout.is_empty() {
                    app.add_context("stdout", &stdout);
                }
                app
            }
            SnapshotError::Malformed(source) => AppError::with_source(
                ErrorCategory::SerializationError,
                format!("snapshot is not valid JSON: {}", source),
                source,
            )
            .with_code("RB-SNAP-002"),
        }
    }
}

impl StateSnapshot {
    /// Parses snapshot text, recognising the `{"error", "stdout"}` envelope of a failed run.
    pub fn parse(text: &str) -> Result<StateSnapshot, SnapshotError> {
        let value: Value = serde_json::from_str(text)?;
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(SnapshotError::Remote {
                error: error.to_string(),
                stdout: value
                    .get("stdout")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Snapshot text for a finished introspection run. Failures still produce JSON.
pub fn snapshot_text(result: ExecutionResult) -> String {
    if result.succeeded() {
        return result.stdout;
    }
    let error = if result.stderr.is_empty() {
        "Failed to get resolve state".to_string()
    } else {
        result.stderr
    };
    json!({ "error": error, "stdout": result.stdout }).to_string()
}
