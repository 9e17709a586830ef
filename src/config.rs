use anyhow::Context;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Location;
use crate::service::classifier::{ClassifierConfig, RiskThresholds, SeverityBoundaries};
use crate::service::scheduler::SchedulerConfig;

/// Process-level configuration: transport endpoints plus the pipeline settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id_prefix: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub instance_id: String,
    pub topic_prefix: String,
    pub prediction_api_url: String,
    pub metrics_port: u16,
    pub monitored_locations: Vec<Location>,
    pub pipeline: PipelineSettings,
}

/// Everything the alerting core needs. `Default` mirrors the documented
/// defaults so tests can build a pipeline without touching the environment.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub alert_trigger_threshold: f64,
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub alerts_enabled: bool,
    pub classifier: ClassifierConfig,
    pub scheduler: SchedulerConfig,
    /// Fixed RNG seed for the synthetic generator; entropy when `None`.
    pub synthetic_seed: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            alert_trigger_threshold: 0.6,
            threshold_min: 0.1,
            threshold_max: 0.9,
            alerts_enabled: true,
            classifier: ClassifierConfig::default(),
            scheduler: SchedulerConfig::default(),
            synthetic_seed: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists, ignore if not

        let defaults = PipelineSettings::default();
        let classifier = ClassifierConfig {
            severity: SeverityBoundaries {
                immediate_hours: env_parse("SEVERITY_IMMEDIATE_HOURS", defaults.classifier.severity.immediate_hours)?,
                urgent_hours: env_parse("SEVERITY_URGENT_HOURS", defaults.classifier.severity.urgent_hours)?,
                warning_hours: env_parse("SEVERITY_WARNING_HOURS", defaults.classifier.severity.warning_hours)?,
            },
            risk: RiskThresholds {
                very_high: env_parse("RISK_VERY_HIGH", defaults.classifier.risk.very_high)?,
                high: env_parse("RISK_HIGH", defaults.classifier.risk.high)?,
                medium: env_parse("RISK_MEDIUM", defaults.classifier.risk.medium)?,
            },
            heavy_rain_cutoff_mm: env_parse("HEAVY_RAIN_CUTOFF_MM", defaults.classifier.heavy_rain_cutoff_mm)?,
            preparation_window_fraction: env_parse(
                "PREPARATION_WINDOW_FRACTION",
                defaults.classifier.preparation_window_fraction,
            )?,
        };
        classifier.severity.validate().context("severity boundaries")?;
        classifier.risk.validate().context("risk thresholds")?;
        if !(classifier.preparation_window_fraction > 0.0 && classifier.preparation_window_fraction <= 1.0) {
            anyhow::bail!("PREPARATION_WINDOW_FRACTION must be in (0, 1]");
        }

        let scheduler = SchedulerConfig {
            urgent_reminder: Duration::from_secs(
                60 * env_parse("URGENT_REMINDER_MINUTES", defaults.scheduler.urgent_reminder.as_secs() / 60)?,
            ),
            warning_reminder_lead: Duration::from_secs(
                3600 * env_parse("WARNING_REMINDER_LEAD_HOURS", defaults.scheduler.warning_reminder_lead.as_secs() / 3600)?,
            ),
            advisory_reminder_lead: Duration::from_secs(
                3600 * env_parse("ADVISORY_REMINDER_LEAD_HOURS", defaults.scheduler.advisory_reminder_lead.as_secs() / 3600)?,
            ),
        };

        let pipeline = PipelineSettings {
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?),
            alert_trigger_threshold: env_parse("ALERT_TRIGGER_THRESHOLD", defaults.alert_trigger_threshold)?,
            threshold_min: env_parse("ALERT_THRESHOLD_MIN", defaults.threshold_min)?,
            threshold_max: env_parse("ALERT_THRESHOLD_MAX", defaults.threshold_max)?,
            alerts_enabled: env_parse("ALERTS_ENABLED", defaults.alerts_enabled)?,
            classifier,
            scheduler,
            synthetic_seed: env::var("SYNTHETIC_SEED")
                .ok()
                .map(|raw| raw.parse())
                .transpose()
                .context("SYNTHETIC_SEED must be a valid u64")?,
        };

        if pipeline.poll_interval.is_zero() {
            anyhow::bail!("POLL_INTERVAL_SECS must be greater than zero");
        }
        if !(pipeline.threshold_min..=pipeline.threshold_max).contains(&pipeline.alert_trigger_threshold) {
            anyhow::bail!(
                "ALERT_TRIGGER_THRESHOLD {} outside {}..={}",
                pipeline.alert_trigger_threshold,
                pipeline.threshold_min,
                pipeline.threshold_max
            );
        }

        let config = AppConfig {
            mqtt_host: env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mqtt_port: env_parse("MQTT_PORT", 1883)?,
            mqtt_client_id_prefix: env::var("MQTT_CLIENT_ID_PREFIX")
                .unwrap_or_else(|_| "flood_alert_pipeline".to_string()),
            mqtt_username: env::var("MQTT_USERNAME").ok(),
            mqtt_password: env::var("MQTT_PASSWORD").ok(),
            instance_id: env::var("INSTANCE_ID").unwrap_or_else(|_| "1".to_string()),
            topic_prefix: env::var("TOPIC_PREFIX").unwrap_or_else(|_| "flood".to_string()),
            prediction_api_url: env::var("PREDICTION_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            metrics_port: env_parse("METRICS_PORT", 9000)?,
            monitored_locations: match env::var("MONITORED_LOCATIONS") {
                Ok(raw) => parse_locations(&raw).context("MONITORED_LOCATIONS")?,
                Err(_) => Vec::new(),
            },
            pipeline,
        };

        Ok(config)
    }
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid {}", key, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

/// Parses `name@lat,lng;name@lat,lng`. Empty entries are skipped.
pub fn parse_locations(raw: &str) -> anyhow::Result<Vec<Location>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, coords) = entry
                .rsplit_once('@')
                .with_context(|| format!("expected name@lat,lng, got {:?}", entry))?;
            let (lat, lng) = coords
                .split_once(',')
                .with_context(|| format!("expected lat,lng in {:?}", entry))?;
            let latitude: f64 = lat.trim().parse().with_context(|| format!("bad latitude in {:?}", entry))?;
            let longitude: f64 = lng.trim().parse().with_context(|| format!("bad longitude in {:?}", entry))?;
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                anyhow::bail!("coordinates out of range in {:?}", entry);
            }
            Ok(Location::new(name.trim(), latitude, longitude))
        })
        .collect()
}
