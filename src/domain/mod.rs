//! Domain model shared by every layer. Types only, no I/O.

mod alert;
mod location;
mod notification;
mod prediction;

pub use alert::{
    format_countdown, Alert, CurrentConditions, FloodTimeframe, GuidancePriority,
    PreparationGuidance, RiskLevel, Severity,
};
pub use location::{Location, LocationKey};
pub use notification::{
    NotificationMetadata, NotificationPriority, NotificationTask, TaskHandle, TriggerAt,
};
pub use prediction::{Confidence, ConfidenceLevel, PredictionSnapshot};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Runtime record of one location being polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub location_key: LocationKey,
    pub location: Location,
    pub active: bool,
    #[serde(with = "time::serde::iso8601")]
    pub started_at: OffsetDateTime,
    pub last_error: Option<String>,
    /// Increments every time a session is (re)started for any key.
    pub generation: u64,
}
