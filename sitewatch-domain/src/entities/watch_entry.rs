// Watch entry entity
// Persisted record of a user flagged for suspicious behavior.
// At most one entry exists per user id; repeat detections bump
// alert_count and last_alert_at instead of creating a second row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::DetectedAnomaly;
use crate::value_objects::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEntry {
    pub user_id: u64,
    pub username: String,
    pub reason: String,
    pub severity: Severity,
    /// Admin who flagged the user manually; `None` for automatic detections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by_name: Option<String>,
    pub first_detected_at: DateTime<Utc>,
    pub last_alert_at: DateTime<Utc>,
    pub alert_count: u64,
    #[serde(default)]
    pub notes: String,
}

impl WatchEntry {
    /// Seeds a fresh entry from the first detection for a user.
    pub fn from_anomaly(anomaly: &DetectedAnomaly) -> Self {
        Self {
            user_id: anomaly.user_id,
            username: anomaly.username.clone(),
            reason: anomaly.description.clone(),
            severity: anomaly.severity,
            added_by: None,
            added_by_name: None,
            first_detected_at: anomaly.detected_at,
            last_alert_at: anomaly.detected_at,
            alert_count: 1,
            notes: anomaly.rule_name.clone(),
        }
    }
}
