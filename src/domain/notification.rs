use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use super::alert::Severity;
use super::location::LocationKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAt {
    Immediate,
    At(#[serde(with = "time::serde::iso8601")] OffsetDateTime),
}

impl TriggerAt {
    /// Deferred trigger time, or `None` if the task should fire now.
    pub fn deferred_until(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match self {
            TriggerAt::Immediate => None,
            TriggerAt::At(at) if *at <= now => None,
            TriggerAt::At(at) => Some(*at),
        }
    }
}

/// Carried on every task so sinks can correlate and deduplicate deliveries.
///
/// `alert_id` is the alert the task was scheduled for. Reminders survive
/// non-material replacements, so it can outlive that alert in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    pub alert_id: Uuid,
    pub location_key: LocationKey,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub trigger_at: TriggerAt,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub metadata: NotificationMetadata,
}

/// Opaque handle returned by a sink for a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn generate() -> Self {
        TaskHandle(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
