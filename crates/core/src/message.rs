//! Queue message shapes.
//!
//! Inbound alert payloads are loosely shaped and go through
//! [`crate::normalize`]; the second-stage embedding task is ours and is
//! strongly typed here.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Second-stage queue message: one alert awaiting embedding.
///
/// Ephemeral -- exists only on the embedding queue and during
/// processing, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingTask {
    /// Id of the alert row the vector belongs to.
    pub alert_id: String,
    /// Text to embed (already normalized, not yet capped).
    pub content: String,
    /// When the task was enqueued (UTC).
    pub timestamp: Timestamp,
}

impl EmbeddingTask {
    pub fn new(alert_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            alert_id: alert_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serializes_with_expected_fields() {
        let task = EmbeddingTask::new("alert_1", "flood warning");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["alert_id"], "alert_1");
        assert_eq!(json["content"], "flood warning");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn task_round_trips() {
        let json = r#"{"alert_id":"a1","content":"fire","timestamp":"2026-01-15T10:00:00Z"}"#;
        let task: EmbeddingTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.alert_id, "a1");
        assert_eq!(task.content, "fire");
    }
}
