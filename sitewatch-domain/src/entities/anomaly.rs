// Detected anomaly and its wire envelope.
// A DetectedAnomaly is transient: produced by the scan loop, consumed
// exactly once by the dispatcher, and only ever persisted folded into a
// WatchEntry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedAnomaly {
    pub user_id: u64,
    pub username: String,
    /// Serialized as `activity_type`: the name observers key on.
    #[serde(rename = "activity_type")]
    pub rule_name: String,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
}

/// Message broadcast to every connected observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub activity: DetectedAnomaly,
    pub timestamp: DateTime<Utc>,
}

pub const ALERT_KIND_SUSPICIOUS_ACTIVITY: &str = "suspicious_activity";

impl AlertEnvelope {
    pub fn suspicious_activity(activity: DetectedAnomaly) -> Self {
        Self {
            kind: ALERT_KIND_SUSPICIOUS_ACTIVITY.to_string(),
            activity,
            timestamp: Utc::now(),
        }
    }
}
