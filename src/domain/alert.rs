use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use super::location::{Location, LocationKey};
use super::prediction::PredictionSnapshot;

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Urgency tier, derived only from countdown. Declaration order is the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Advisory,
    Warning,
    Urgent,
    Immediate,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Advisory => "advisory",
            Severity::Warning => "warning",
            Severity::Urgent => "urgent",
            Severity::Immediate => "immediate",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magnitude tier, derived only from probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodTimeframe {
    #[serde(with = "time::serde::iso8601")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    pub end: OffsetDateTime,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Observed rainfall over the last 24h, mm.
    pub rainfall: f64,
    /// Celsius.
    pub temperature: f64,
    /// Relative humidity, percent. Not every provider reports it.
    pub humidity: Option<f64>,
    /// Cubic metres per second; only synthesized conditions carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river_discharge: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidancePriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparationGuidance {
    pub priority: GuidancePriority,
    pub message: String,
    pub actions: Vec<String>,
    pub time_estimate: String,
}

/// A live hazard record for one location.
///
/// Alerts are never mutated after construction. A changed condition produces
/// a new `Alert` (with a new `id`) which replaces the old one in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub location: Location,
    pub flood_timeframe: FloodTimeframe,
    pub countdown_millis: u64,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    /// Predicted 24h rainfall, mm.
    pub expected_rainfall: f64,
    pub current_conditions: CurrentConditions,
    pub prediction_snapshot: PredictionSnapshot,
    pub preparation_guidance: PreparationGuidance,
    #[serde(with = "time::serde::iso8601")]
    pub created_at: OffsetDateTime,
    pub is_active: bool,
}

impl Alert {
    pub fn location_key(&self) -> LocationKey {
        self.location.key()
    }

    pub fn countdown_label(&self) -> String {
        format_countdown(self.countdown_millis)
    }

    /// Whether replacing `previous` with `self` is worth telling the user about.
    pub fn differs_materially_from(&self, previous: &Alert) -> bool {
        self.severity != previous.severity || self.risk_level != previous.risk_level
    }
}

/// Human-readable countdown, e.g. `"3h 20m"` or `"2d 4h"`.
pub fn format_countdown(millis: u64) -> String {
    if millis == 0 {
        return "Flood conditions now".to_string();
    }

    let days = millis / DAY_MS;
    let hours = (millis % DAY_MS) / HOUR_MS;
    let minutes = (millis % HOUR_MS) / MINUTE_MS;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        "<1m".to_string()
    }
}
