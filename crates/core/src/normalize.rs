//! Inbound payload normalization.
//!
//! Producers send loosely shaped JSON: field names vary between feeds
//! (`alert_type` vs legacy `type`, nested vs flat coordinates), optional
//! fields come and go, and ids may be absent. [`normalize`] maps every
//! accepted shape into one canonical [`AlertRecord`], failing closed only
//! on a missing required field (`content`) and failing open -- with a
//! default or a dropped value -- on everything optional.

use serde_json::Value;

use crate::alert::{validate_severity, AlertRecord};

/// Source recorded when the producer did not name one.
const UNKNOWN_SOURCE: &str = "unknown";

/// Normalization failure for a structurally invalid payload.
///
/// Carries whatever identity could be salvaged from the payload so the
/// caller can still dead-letter a stub row for it.
#[derive(Debug)]
pub struct NormalizationError {
    /// Producer-supplied id, or a generated one when absent.
    pub id: String,
    /// Producer-supplied source, or `"unknown"`.
    pub source: String,
    /// What was wrong with the payload.
    pub reason: String,
}

impl std::fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cannot normalize alert {}: {}", self.id, self.reason)
    }
}

impl std::error::Error for NormalizationError {}

/// Map a raw inbound payload into a canonical [`AlertRecord`].
///
/// Accepted aliases and defaults:
/// - `alert_type` or legacy `type`
/// - `coordinates.latitude`/`longitude` or flat `latitude`/`longitude`
/// - missing `id` generates `alert_<uuid>` (not an error)
/// - missing `source` defaults to `"unknown"`
/// - severity outside 1-5 is dropped with a warning, not an error
///
/// Fails only when the `content` key is entirely absent. An empty
/// `content` string normalizes fine; the pipeline later skips its
/// embedding step.
pub fn normalize(raw: &Value) -> Result<AlertRecord, NormalizationError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(generate_alert_id);

    let source = raw
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string();

    let content = match raw.get("content").and_then(Value::as_str) {
        Some(c) => c.to_string(),
        None => {
            return Err(NormalizationError {
                id,
                source,
                reason: "payload has no 'content' field".to_string(),
            })
        }
    };

    let alert_type = raw
        .get("alert_type")
        .or_else(|| raw.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let severity = raw.get("severity").and_then(Value::as_i64).and_then(|s| {
        let s = s as i16;
        match validate_severity(s) {
            Ok(()) => Some(s),
            Err(_) => {
                tracing::warn!(alert_uid = %id, severity = s, "Dropping out-of-range severity");
                None
            }
        }
    });

    let location = raw
        .get("location")
        .and_then(Value::as_str)
        .map(str::to_string);

    let (latitude, longitude) = extract_coordinates(raw);

    let metadata = raw
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let created_at = raw
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    Ok(AlertRecord {
        id,
        source,
        alert_type,
        severity,
        location,
        latitude,
        longitude,
        content,
        metadata,
        created_at,
    })
}

/// Generate a fresh unique alert id.
pub fn generate_alert_id() -> String {
    format!("alert_{}", uuid::Uuid::new_v4().simple())
}

/// Pull coordinates from either the nested or the flat form.
///
/// Flat `latitude`/`longitude` wins when both forms are present.
fn extract_coordinates(raw: &Value) -> (Option<f64>, Option<f64>) {
    let flat_lat = raw.get("latitude").and_then(Value::as_f64);
    let flat_lon = raw.get("longitude").and_then(Value::as_f64);

    if flat_lat.is_some() || flat_lon.is_some() {
        return (flat_lat, flat_lon);
    }

    match raw.get("coordinates") {
        Some(Value::Object(coords)) => (
            coords.get("latitude").and_then(Value::as_f64),
            coords.get("longitude").and_then(Value::as_f64),
        ),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_payload_normalizes() {
        let raw = json!({
            "id": "test-flood-001",
            "source": "weather_api",
            "content": "Severe flood warning for coastal areas.",
            "alert_type": "flood",
            "severity": 4,
            "location": "Mumbai, Maharashtra",
            "latitude": 19.076,
            "longitude": 72.877,
            "metadata": {"confidence": 0.9}
        });

        let record = normalize(&raw).unwrap();
        assert_eq!(record.id, "test-flood-001");
        assert_eq!(record.source, "weather_api");
        assert_eq!(record.alert_type.as_deref(), Some("flood"));
        assert_eq!(record.severity, Some(4));
        assert_eq!(record.latitude, Some(19.076));
        assert_eq!(record.metadata["confidence"], 0.9);
    }

    #[test]
    fn legacy_type_field_is_accepted() {
        let raw = json!({"source": "sim", "content": "quake", "type": "earthquake"});
        let record = normalize(&raw).unwrap();
        assert_eq!(record.alert_type.as_deref(), Some("earthquake"));
    }

    #[test]
    fn alert_type_wins_over_legacy_type() {
        let raw = json!({
            "source": "sim",
            "content": "x",
            "alert_type": "flood",
            "type": "earthquake"
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(record.alert_type.as_deref(), Some("flood"));
    }

    #[test]
    fn nested_coordinates_are_accepted() {
        let raw = json!({
            "source": "sim",
            "content": "x",
            "coordinates": {"latitude": 31.1, "longitude": 77.17}
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(record.latitude, Some(31.1));
        assert_eq!(record.longitude, Some(77.17));
    }

    #[test]
    fn flat_coordinates_win_over_nested() {
        let raw = json!({
            "source": "sim",
            "content": "x",
            "latitude": 1.0,
            "longitude": 2.0,
            "coordinates": {"latitude": 9.0, "longitude": 9.0}
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(record.latitude, Some(1.0));
        assert_eq!(record.longitude, Some(2.0));
    }

    #[test]
    fn missing_id_generates_one() {
        let raw = json!({"source": "sim", "content": "x"});
        let a = normalize(&raw).unwrap();
        let b = normalize(&raw).unwrap();
        assert!(a.id.starts_with("alert_"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn missing_source_defaults_to_unknown() {
        let raw = json!({"content": "x"});
        assert_eq!(normalize(&raw).unwrap().source, "unknown");
    }

    #[test]
    fn missing_content_fails_with_salvaged_identity() {
        let raw = json!({"id": "a9", "source": "sim", "severity": 3});
        let err = normalize(&raw).unwrap_err();
        assert_eq!(err.id, "a9");
        assert_eq!(err.source, "sim");
        assert!(err.reason.contains("content"));
    }

    #[test]
    fn empty_content_is_not_an_error() {
        let raw = json!({"source": "sim", "content": ""});
        let record = normalize(&raw).unwrap();
        assert_eq!(record.content, "");
    }

    #[test]
    fn out_of_range_severity_is_dropped() {
        let raw = json!({"source": "sim", "content": "x", "severity": 9});
        assert_eq!(normalize(&raw).unwrap().severity, None);
    }

    #[test]
    fn producer_created_at_is_preserved() {
        let raw = json!({
            "source": "sim",
            "content": "x",
            "created_at": "2026-01-15T10:00:00Z"
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(record.created_at.to_rfc3339(), "2026-01-15T10:00:00+00:00");
    }
}
