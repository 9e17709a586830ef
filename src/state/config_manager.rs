use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::service::classifier::{ClassifierConfig, RiskThresholds, SeverityBoundaries};

/// The settings a tick reads. Taken as one snapshot per evaluation so a
/// concurrent update never mixes old and new tables within an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub alert_trigger_threshold: f64,
    pub alerts_enabled: bool,
    pub classifier: ClassifierConfig,
}

/// Runtime-tunable settings. Every setter validates first; a rejected value
/// is logged and the previous value stays in effect.
pub struct ConfigManager {
    settings: RwLock<RuntimeSettings>,
    threshold_min: f64,
    threshold_max: f64,
}

impl ConfigManager {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            settings: RwLock::new(RuntimeSettings {
                alert_trigger_threshold: settings.alert_trigger_threshold,
                alerts_enabled: settings.alerts_enabled,
                classifier: settings.classifier,
            }),
            threshold_min: settings.threshold_min,
            threshold_max: settings.threshold_max,
        }
    }

    pub fn snapshot(&self) -> RuntimeSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn alert_trigger_threshold(&self) -> f64 {
        self.snapshot().alert_trigger_threshold
    }

    pub fn alerts_enabled(&self) -> bool {
        self.snapshot().alerts_enabled
    }

    pub fn threshold_range(&self) -> (f64, f64) {
        (self.threshold_min, self.threshold_max)
    }

    pub fn set_alert_trigger_threshold(&self, value: f64) -> Result<(), PipelineError> {
        if !(self.threshold_min..=self.threshold_max).contains(&value) {
            let err = PipelineError::ThresholdOutOfRange {
                value,
                min: self.threshold_min,
                max: self.threshold_max,
            };
            warn!("Rejected alert trigger threshold: {}", err);
            return Err(err);
        }

        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let previous = settings.alert_trigger_threshold;
        settings.alert_trigger_threshold = value;
        info!(previous, current = value, "Alert trigger threshold updated");
        Ok(())
    }

    /// Returns the previous value.
    pub fn set_alerts_enabled(&self, enabled: bool) -> bool {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut settings.alerts_enabled, enabled);
        if previous != enabled {
            info!(enabled, "Alert notifications toggled");
        }
        previous
    }

    pub fn set_severity_boundaries(&self, boundaries: SeverityBoundaries) -> Result<(), PipelineError> {
        if let Err(err) = boundaries.validate() {
            warn!("Rejected severity boundaries: {}", err);
            return Err(err);
        }
        self.settings.write().unwrap_or_else(PoisonError::into_inner).classifier.severity = boundaries;
        info!(?boundaries, "Severity boundaries updated");
        Ok(())
    }

    pub fn set_risk_thresholds(&self, thresholds: RiskThresholds) -> Result<(), PipelineError> {
        if let Err(err) = thresholds.validate() {
            warn!("Rejected risk thresholds: {}", err);
            return Err(err);
        }
        self.settings.write().unwrap_or_else(PoisonError::into_inner).classifier.risk = thresholds;
        info!(?thresholds, "Risk thresholds updated");
        Ok(())
    }
}
