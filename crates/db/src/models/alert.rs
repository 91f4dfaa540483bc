//! Alert row model and insert DTO.
//!
//! The `embedding` column is pgvector `vector(1024)` in the database and
//! is deliberately kept out of the `FromRow` struct: we use runtime
//! queries, so vectors are passed as text (`'[0.1,0.2,...]'::vector`)
//! and cast in SQL (see `repositories::alert_repo`).

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::alert::AlertRecord;
use vigil_core::types::Timestamp;

/// A row from the `alerts` table, minus the embedding vector.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub alert_uid: String,
    pub source: String,
    pub alert_type: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: Option<i16>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: String,
    pub error_message: Option<String>,
    pub is_active: bool,
    pub raw_data: serde_json::Value,
    pub start_time: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Whether the embedding column is populated (the vector itself is
    /// read via dedicated casts, not through this struct).
    pub has_embedding: bool,
}

/// Insert DTO derived from a canonical [`AlertRecord`].
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_uid: String,
    pub source: String,
    pub alert_type: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: Option<i16>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub raw_data: serde_json::Value,
    pub start_time: Timestamp,
}

impl From<&AlertRecord> for NewAlert {
    fn from(record: &AlertRecord) -> Self {
        let raw_data = serde_json::to_value(record)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
        Self {
            alert_uid: record.id.clone(),
            source: record.source.clone(),
            alert_type: record.alert_type.clone(),
            title: record.title(),
            description: record.content.clone(),
            severity: record.severity,
            location: record.location.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            raw_data,
            start_time: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_alert_maps_content_to_description() {
        let record = AlertRecord {
            id: "a1".to_string(),
            source: "weather_api".to_string(),
            alert_type: Some("flood".to_string()),
            severity: Some(4),
            location: Some("Mumbai".to_string()),
            latitude: Some(19.076),
            longitude: Some(72.877),
            content: "flood warning".to_string(),
            metadata: serde_json::json!({"confidence": 0.9}),
            created_at: chrono::Utc::now(),
        };

        let new_alert = NewAlert::from(&record);
        assert_eq!(new_alert.alert_uid, "a1");
        assert_eq!(new_alert.description, "flood warning");
        assert_eq!(new_alert.title, "Flood Alert");
        assert_eq!(new_alert.raw_data["source"], "weather_api");
        assert_eq!(new_alert.raw_data["metadata"]["confidence"], 0.9);
    }
}
