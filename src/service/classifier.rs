//! Severity and risk classification.
//!
//! Severity is a function of countdown only, risk level a function of
//! probability only. Both tables are plain data so they can be swapped at
//! runtime through `ConfigManager`.

use std::time::Duration;

use crate::domain::{PredictionSnapshot, RiskLevel, Severity};
use crate::error::PipelineError;

/// Upper bound on lead time, keeps `Duration::from_secs_f64` in range.
const MAX_LEAD_HOURS: f64 = 24.0 * 366.0;

/// Inclusive upper hour bounds for each tier; anything longer is advisory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityBoundaries {
    pub immediate_hours: f64,
    pub urgent_hours: f64,
    pub warning_hours: f64,
}

impl Default for SeverityBoundaries {
    fn default() -> Self {
        Self {
            immediate_hours: 2.0,
            urgent_hours: 6.0,
            warning_hours: 12.0,
        }
    }
}

impl SeverityBoundaries {
    pub fn severity_for(&self, countdown: Duration) -> Severity {
        let hours = countdown.as_secs_f64() / 3600.0;
        if hours <= self.immediate_hours {
            Severity::Immediate
        } else if hours <= self.urgent_hours {
            Severity::Urgent
        } else if hours <= self.warning_hours {
            Severity::Warning
        } else {
            Severity::Advisory
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let bounds = [self.immediate_hours, self.urgent_hours, self.warning_hours];
        if bounds.iter().any(|h| !h.is_finite() || *h < 0.0) {
            return Err(PipelineError::InvalidSeverityBoundaries {
                reason: format!("hours must be finite and non-negative, got {:?}", bounds),
            });
        }
        if !(self.immediate_hours < self.urgent_hours && self.urgent_hours < self.warning_hours) {
            return Err(PipelineError::InvalidSeverityBoundaries {
                reason: format!("expected immediate < urgent < warning, got {:?}", bounds),
            });
        }
        Ok(())
    }
}

/// Inclusive lower probability bounds; anything below `medium` is low risk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            very_high: 0.8,
            high: 0.6,
            medium: 0.3,
        }
    }
}

impl RiskThresholds {
    pub fn risk_for(&self, probability: f64) -> RiskLevel {
        if probability >= self.very_high {
            RiskLevel::VeryHigh
        } else if probability >= self.high {
            RiskLevel::High
        } else if probability >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let bounds = [self.medium, self.high, self.very_high];
        if bounds.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(PipelineError::InvalidRiskThresholds {
                reason: format!("thresholds must lie in 0..=1, got {:?}", bounds),
            });
        }
        if !(self.medium < self.high && self.high < self.very_high) {
            return Err(PipelineError::InvalidRiskThresholds {
                reason: format!("expected medium < high < very_high, got {:?}", bounds),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub severity: SeverityBoundaries,
    pub risk: RiskThresholds,
    /// Observed 24h rainfall at or above this means flooding is already under way.
    pub heavy_rain_cutoff_mm: f64,
    /// Share of the predicted timeframe treated as time to prepare.
    pub preparation_window_fraction: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            severity: SeverityBoundaries::default(),
            risk: RiskThresholds::default(),
            heavy_rain_cutoff_mm: 100.0,
            preparation_window_fraction: 0.25,
        }
    }
}

/// How a lead time becomes a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownBasis {
    /// Countdown is a fraction of the predicted timeframe (live monitoring).
    PreparationWindow,
    /// Countdown is the lead time itself (synthetic alerts).
    LeadTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierInput {
    pub probability: f64,
    pub lead_time_hours: f64,
    pub observed_rainfall_mm: Option<f64>,
    pub happening_now: bool,
}

impl ClassifierInput {
    pub fn from_snapshot(snapshot: &PredictionSnapshot) -> Self {
        Self {
            probability: snapshot.probability,
            lead_time_hours: snapshot.timeframe_hours,
            observed_rainfall_mm: Some(snapshot.rainfall_24h),
            happening_now: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub countdown: Duration,
    /// Flooding is considered under way (zero lead time or heavy rain observed).
    pub imminent: bool,
}

impl Classification {
    pub fn countdown_millis(&self) -> u64 {
        self.countdown.as_millis() as u64
    }
}

pub fn classify(input: &ClassifierInput, basis: CountdownBasis, config: &ClassifierConfig) -> Classification {
    let risk_level = config.risk.risk_for(input.probability);

    let lead_hours = if input.lead_time_hours.is_finite() {
        input.lead_time_hours.clamp(0.0, MAX_LEAD_HOURS)
    } else {
        0.0
    };
    let heavy_rain = input
        .observed_rainfall_mm
        .map_or(false, |mm| mm >= config.heavy_rain_cutoff_mm);

    if input.happening_now || heavy_rain || lead_hours == 0.0 {
        return Classification {
            severity: Severity::Immediate,
            risk_level,
            countdown: Duration::ZERO,
            imminent: true,
        };
    }

    let countdown_hours = match basis {
        CountdownBasis::PreparationWindow => lead_hours * config.preparation_window_fraction,
        CountdownBasis::LeadTime => lead_hours,
    };
    let countdown = Duration::from_secs_f64(countdown_hours * 3600.0);

    Classification {
        severity: config.severity.severity_for(countdown),
        risk_level,
        countdown,
        imminent: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(probability: f64, lead_time_hours: f64) -> ClassifierInput {
        ClassifierInput {
            probability,
            lead_time_hours,
            observed_rainfall_mm: None,
            happening_now: false,
        }
    }

    fn hours(h: f64) -> Duration {
        Duration::from_secs_f64(h * 3600.0)
    }

    #[test]
    fn test_default_severity_table() {
        let b = SeverityBoundaries::default();
        assert_eq!(b.severity_for(hours(0.0)), Severity::Immediate);
        assert_eq!(b.severity_for(hours(2.0)), Severity::Immediate);
        assert_eq!(b.severity_for(hours(2.01)), Severity::Urgent);
        assert_eq!(b.severity_for(hours(6.0)), Severity::Urgent);
        assert_eq!(b.severity_for(hours(12.0)), Severity::Warning);
        assert_eq!(b.severity_for(hours(12.5)), Severity::Advisory);
    }

    #[test]
    fn test_default_risk_table() {
        let r = RiskThresholds::default();
        assert_eq!(r.risk_for(0.95), RiskLevel::VeryHigh);
        assert_eq!(r.risk_for(0.8), RiskLevel::VeryHigh);
        assert_eq!(r.risk_for(0.6), RiskLevel::High);
        assert_eq!(r.risk_for(0.3), RiskLevel::Medium);
        assert_eq!(r.risk_for(0.29), RiskLevel::Low);
    }

    #[test]
    fn test_severity_is_monotonic_in_countdown() {
        let b = SeverityBoundaries::default();
        let mut previous = Severity::Immediate;
        for minutes in (0..=48 * 60).step_by(7) {
            let severity = b.severity_for(Duration::from_secs(minutes * 60));
            assert!(
                severity <= previous,
                "severity rose from {} to {} at {} minutes",
                previous,
                severity,
                minutes
            );
            previous = severity;
        }
    }

    #[test]
    fn test_zero_lead_time_is_immediate_with_zero_countdown() {
        let c = classify(&input(0.9, 0.0), CountdownBasis::LeadTime, &ClassifierConfig::default());
        assert_eq!(c.severity, Severity::Immediate);
        assert_eq!(c.countdown, Duration::ZERO);
        assert_eq!(c.risk_level, RiskLevel::VeryHigh);
        assert!(c.imminent);
    }

    #[test]
    fn test_heavy_observed_rain_forces_immediate() {
        let mut i = input(0.7, 24.0);
        i.observed_rainfall_mm = Some(120.0);
        let c = classify(&i, CountdownBasis::PreparationWindow, &ClassifierConfig::default());
        assert_eq!(c.severity, Severity::Immediate);
        assert_eq!(c.countdown_millis(), 0);
    }

    #[test]
    fn test_lead_time_basis_uses_raw_lead_time() {
        let c = classify(&input(0.65, 6.0), CountdownBasis::LeadTime, &ClassifierConfig::default());
        assert_eq!(c.severity, Severity::Urgent);
        assert_eq!(c.countdown, hours(6.0));
        assert_eq!(c.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_preparation_window_basis_uses_quarter_of_timeframe() {
        let config = ClassifierConfig::default();
        let c = classify(&input(0.65, 6.0), CountdownBasis::PreparationWindow, &config);
        assert_eq!(c.countdown, hours(1.5));
        assert_eq!(c.severity, Severity::Immediate);

        let c = classify(&input(0.65, 40.0), CountdownBasis::PreparationWindow, &config);
        assert_eq!(c.countdown, hours(10.0));
        assert_eq!(c.severity, Severity::Warning);
    }

    #[test]
    fn test_boundaries_are_tunable() {
        let config = ClassifierConfig {
            severity: SeverityBoundaries {
                immediate_hours: 1.0,
                urgent_hours: 3.0,
                warning_hours: 5.0,
            },
            ..ClassifierConfig::default()
        };
        let c = classify(&input(0.65, 4.0), CountdownBasis::LeadTime, &config);
        assert_eq!(c.severity, Severity::Warning);
    }

    #[test]
    fn test_validation_rejects_unordered_tables() {
        let bad = SeverityBoundaries {
            immediate_hours: 6.0,
            urgent_hours: 2.0,
            warning_hours: 12.0,
        };
        assert!(matches!(bad.validate(), Err(PipelineError::InvalidSeverityBoundaries { .. })));

        let bad = RiskThresholds {
            very_high: 0.5,
            high: 0.6,
            medium: 0.3,
        };
        assert!(matches!(bad.validate(), Err(PipelineError::InvalidRiskThresholds { .. })));
        assert!(SeverityBoundaries::default().validate().is_ok());
        assert!(RiskThresholds::default().validate().is_ok());
    }
}
