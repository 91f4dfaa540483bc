//! Canonical alert record and its processing-status lattice.
//!
//! [`AlertRecord`] is the single shape every inbound payload is mapped
//! into before anything touches the queue or the store. [`AlertStatus`]
//! mirrors the `status` column of the `alerts` table; transitions only
//! move forward, so a record can never return to a pre-embedding state.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Lowest accepted severity (least severe).
pub const MIN_SEVERITY: i16 = 1;

/// Highest accepted severity (most severe).
pub const MAX_SEVERITY: i16 = 5;

/// One disaster-alert event in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Globally unique alert id, producer-assigned or generated during
    /// normalization (`alert_<uuid>`).
    pub id: String,
    /// Originating feed (e.g. `weather_api`, `social_media`).
    pub source: String,
    /// Kind of disaster (`flood`, `wildfire`, ...), if the producer sent one.
    pub alert_type: Option<String>,
    /// Severity on a 1-5 scale, 5 being most severe.
    pub severity: Option<i16>,
    /// Free-text location description.
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Text submitted to the embedding provider. May be empty, in which
    /// case embedding is skipped rather than failed.
    pub content: String,
    /// Open key-value map carried through to the store untouched.
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl AlertRecord {
    /// Display title for the stored row, derived from the alert type.
    pub fn title(&self) -> String {
        match &self.alert_type {
            Some(t) if !t.is_empty() => {
                let mut chars = t.chars();
                match chars.next() {
                    Some(first) => format!("{}{} Alert", first.to_uppercase(), chars.as_str()),
                    None => "New Alert".to_string(),
                }
            }
            _ => "New Alert".to_string(),
        }
    }
}

/// Processing status of an alert row.
///
/// Stored as text in the `status` column. The lattice is forward-only:
///
/// ```text
/// Pending -> Processing -> Embedded
///     \           \-----> Failed
///      \----------------> Skipped | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Stored, awaiting embedding.
    Pending,
    /// Claimed by a worker; embedding in flight.
    Processing,
    /// Terminal: embedding stored.
    Embedded,
    /// Terminal: no content to embed (success without embedding).
    Skipped,
    /// Terminal: dead-lettered with a recorded reason.
    Failed,
}

impl AlertStatus {
    /// Column value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Embedded => "embedded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Parse a column value back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "embedded" => Some(Self::Embedded),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Embedded | Self::Skipped | Self::Failed)
    }

    /// Whether a transition to `next` moves forward in the lattice.
    ///
    /// Terminal states admit nothing; `Pending` may move to any later
    /// state; `Processing` may only resolve to a terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Processing | Self::Embedded | Self::Skipped | Self::Failed
            ),
            Self::Processing => next.is_terminal(),
            Self::Embedded | Self::Skipped | Self::Failed => false,
        }
    }
}

/// Validate a severity value against the accepted 1-5 range.
pub fn validate_severity(severity: i16) -> Result<(), CoreError> {
    if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&severity) {
        return Err(CoreError::Validation(format!(
            "Severity must be between {MIN_SEVERITY} and {MAX_SEVERITY}, got {severity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [
            AlertStatus::Pending,
            AlertStatus::Processing,
            AlertStatus::Embedded,
            AlertStatus::Skipped,
            AlertStatus::Failed,
        ] {
            assert_eq!(AlertStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!(AlertStatus::parse("done"), None);
        assert_eq!(AlertStatus::parse(""), None);
    }

    #[test]
    fn pending_advances_to_any_later_state() {
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Processing));
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Embedded));
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Skipped));
        assert!(AlertStatus::Pending.can_transition_to(AlertStatus::Failed));
    }

    #[test]
    fn processing_only_resolves_terminally() {
        assert!(AlertStatus::Processing.can_transition_to(AlertStatus::Embedded));
        assert!(AlertStatus::Processing.can_transition_to(AlertStatus::Failed));
        assert!(!AlertStatus::Processing.can_transition_to(AlertStatus::Pending));
        assert!(!AlertStatus::Processing.can_transition_to(AlertStatus::Processing));
    }

    #[test]
    fn terminal_states_never_advance() {
        for terminal in [
            AlertStatus::Embedded,
            AlertStatus::Skipped,
            AlertStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                AlertStatus::Pending,
                AlertStatus::Processing,
                AlertStatus::Embedded,
                AlertStatus::Skipped,
                AlertStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn severity_bounds() {
        assert!(validate_severity(1).is_ok());
        assert!(validate_severity(5).is_ok());
        assert!(validate_severity(0).is_err());
        assert!(validate_severity(6).is_err());
    }

    #[test]
    fn title_capitalizes_alert_type() {
        let mut record = sample_record();
        record.alert_type = Some("flood".to_string());
        assert_eq!(record.title(), "Flood Alert");

        record.alert_type = None;
        assert_eq!(record.title(), "New Alert");
    }

    fn sample_record() -> AlertRecord {
        AlertRecord {
            id: "alert_test".to_string(),
            source: "test".to_string(),
            alert_type: None,
            severity: None,
            location: None,
            latitude: None,
            longitude: None,
            content: "flood warning".to_string(),
            metadata: serde_json::Value::Object(Default::default()),
            created_at: chrono::Utc::now(),
        }
    }
}
