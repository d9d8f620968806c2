use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{EventId, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDeliveryRecord {
    pub timestamp: DateTime<Utc>,
    pub alert_id: String,
    pub source_event_id: EventId,
    pub severity: Severity,
    pub status: String,
    pub mode: String,
    pub attempts: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
