use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{
    format_countdown, Alert, CurrentConditions, FloodTimeframe, Location, LocationKey,
    PredictionSnapshot,
};
use crate::service::classifier::{classify, ClassifierConfig, ClassifierInput, CountdownBasis};
use crate::service::guidance::resolve_guidance;
use crate::service::scheduler::NotificationScheduler;
use crate::state::{AlertStore, ConfigManager, StoreWrite};

/// "Happening now" alerts cover a short fixed window starting at creation.
const HAPPENING_NOW_WINDOW: Duration = Duration::from_secs(3 * 3600);
/// Used when the provider does not say how long flooding will last.
const DEFAULT_FLOOD_DURATION_HOURS: f64 = 6.0;
const MAX_HOURS: f64 = 24.0 * 366.0;

/// One prediction to evaluate for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub location: Location,
    pub snapshot: PredictionSnapshot,
    pub basis: CountdownBasis,
    pub conditions: CurrentConditions,
}

impl Observation {
    /// A provider result, as seen by the live monitor.
    pub fn live(location: Location, snapshot: PredictionSnapshot) -> Self {
        let snapshot = snapshot.normalized();
        let conditions = CurrentConditions {
            rainfall: snapshot.rainfall_24h,
            temperature: snapshot.current_temp,
            humidity: snapshot.humidity,
            river_discharge: None,
        };
        Self {
            location,
            snapshot,
            basis: CountdownBasis::PreparationWindow,
            conditions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// New alert for a key that had none.
    Raised(Alert),
    /// Existing alert replaced. `material` is true when severity or risk changed.
    Replaced { alert: Alert, material: bool },
    /// Below threshold; a live alert was removed.
    Cleared,
    /// Below threshold and nothing was live.
    Quiet,
    /// The owning session was stopped before the write could land.
    Cancelled,
}

impl TickOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            TickOutcome::Raised(alert) | TickOutcome::Replaced { alert, .. } => Some(alert),
            _ => None,
        }
    }
}

/// Classifies observations and drives the store and the scheduler.
/// Both the live monitor and the synthetic generator go through here.
///
/// Everything that touches one key (store write plus scheduling, clear plus
/// cancellation, dismiss) runs under that key's async lock, so a dismiss or
/// a second evaluation can never interleave with reminders being submitted.
pub struct AlertProcessor {
    store: Arc<AlertStore>,
    scheduler: Arc<NotificationScheduler>,
    config: Arc<ConfigManager>,
    key_locks: DashMap<LocationKey, Arc<Mutex<()>>>,
}

impl AlertProcessor {
    pub fn new(store: Arc<AlertStore>, scheduler: Arc<NotificationScheduler>, config: Arc<ConfigManager>) -> Self {
        Self {
            store,
            scheduler,
            config,
            key_locks: DashMap::new(),
        }
    }

    /// Evaluate one observation.
    ///
    /// `session` is the owning monitor's token. Writes are dropped once it is
    /// cancelled, which is what keeps a stopped location from being written.
    #[instrument(
        skip(self, observation, session),
        fields(location = %observation.location.key(), probability = observation.snapshot.probability)
    )]
    pub async fn process(&self, observation: Observation, session: Option<&CancellationToken>) -> TickOutcome {
        let key = observation.location.key();
        let lock = self.key_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.evaluate(key.clone(), observation, session).await
        };
        drop(lock);
        if outcome.alert().is_none() {
            self.release_key_lock(&key);
        }
        outcome
    }

    // Settings are read under the key lock so a concurrent disable either
    // sees this key in `withdraw_notifications` or is seen here.
    async fn evaluate(
        &self,
        key: LocationKey,
        observation: Observation,
        session: Option<&CancellationToken>,
    ) -> TickOutcome {
        let settings = self.config.snapshot();
        let live = || session.map_or(true, |token| !token.is_cancelled());

        if observation.snapshot.probability < settings.alert_trigger_threshold {
            return match self.store.clear_if(&key, live) {
                StoreWrite::Rejected => TickOutcome::Cancelled,
                StoreWrite::Applied { previous: None } => TickOutcome::Quiet,
                StoreWrite::Applied { previous: Some(old) } => {
                    self.scheduler.cancel_all(&key).await;
                    info!(alert_id = %old.id, "Alert RESOLVED, probability below threshold");
                    metrics::counter!("alerts_cleared_total", 1);
                    TickOutcome::Cleared
                }
            };
        }

        let alert = build_alert(&observation, &settings.classifier, OffsetDateTime::now_utc());
        let previous = match self.store.upsert_if(key.clone(), alert.clone(), live) {
            StoreWrite::Rejected => return TickOutcome::Cancelled,
            StoreWrite::Applied { previous } => previous,
        };

        // A key that was never notified (alerts were off when it was raised)
        // is scheduled on the first tick after notifications come back.
        let material = previous.as_ref().map_or(true, |old| alert.differs_materially_from(old));
        let needs_schedule = material || !self.scheduler.is_notified(&key);
        if needs_schedule && settings.alerts_enabled {
            if previous.is_some() {
                self.scheduler.cancel_all(&key).await;
            }
            self.scheduler.schedule(&key, &alert, session).await;
        } else if needs_schedule {
            debug!("Alerts disabled, notifications suppressed");
        }

        match previous {
            None => {
                info!(
                    alert_id = %alert.id,
                    severity = %alert.severity,
                    risk = %alert.risk_level,
                    countdown = %format_countdown(alert.countdown_millis),
                    "Alert RAISED"
                );
                metrics::counter!("alerts_raised_total", 1, "severity" => alert.severity.as_str());
                TickOutcome::Raised(alert)
            }
            Some(_) => {
                debug!(alert_id = %alert.id, material, "Alert replaced");
                metrics::counter!("alerts_replaced_total", 1);
                TickOutcome::Replaced { alert, material }
            }
        }
    }

    /// Clears the alert for `key` and withdraws its pending reminders.
    pub async fn dismiss(&self, key: &LocationKey) -> Option<Alert> {
        let lock = self.key_lock(key);
        let removed = {
            let _guard = lock.lock().await;
            let removed = self.store.clear(key);
            self.scheduler.cancel_all(key).await;
            removed
        };
        drop(lock);
        self.release_key_lock(key);
        if let Some(alert) = &removed {
            info!(location = %key, alert_id = %alert.id, "Alert DISMISSED");
        }
        removed
    }

    /// Cancels reminders for every key, waiting out evaluations in flight.
    /// Callers flip `alerts_enabled` off first.
    pub async fn withdraw_notifications(&self) -> usize {
        let mut keys = self.scheduler.tracked_keys();
        keys.extend(self.key_locks.iter().map(|entry| entry.key().clone()));
        keys.sort();
        keys.dedup();

        let mut cancelled = 0;
        for key in keys {
            let lock = self.key_lock(&key);
            {
                let _guard = lock.lock().await;
                cancelled += self.scheduler.cancel_all(&key).await;
            }
            drop(lock);
            self.release_key_lock(&key);
        }
        cancelled
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    fn key_lock(&self, key: &LocationKey) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.clone()).or_default().clone()
    }

    // Only the map's own reference left means nobody holds or waits on it.
    fn release_key_lock(&self, key: &LocationKey) {
        self.key_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        self.key_locks.len()
    }
}

/// Builds the alert for an observation at `now`. Pure.
pub fn build_alert(observation: &Observation, classifier: &ClassifierConfig, now: OffsetDateTime) -> Alert {
    let snapshot = &observation.snapshot;
    let classification = classify(&ClassifierInput::from_snapshot(snapshot), observation.basis, classifier);
    let guidance = resolve_guidance(classification.countdown, &classifier.severity);

    let flood_timeframe = if classification.imminent {
        FloodTimeframe {
            start: now,
            end: now + HAPPENING_NOW_WINDOW,
            description: "Flood conditions now".to_string(),
        }
    } else {
        let lead = hours_to_duration(snapshot.timeframe_hours);
        let duration = hours_to_duration(
            snapshot
                .expected_duration_hours
                .unwrap_or(DEFAULT_FLOOD_DURATION_HOURS),
        );
        let start = now + lead;
        FloodTimeframe {
            start,
            end: start + duration,
            description: format!(
                "Flooding expected in {}, lasting about {}",
                format_countdown(lead.as_millis() as u64),
                format_countdown(duration.as_millis() as u64)
            ),
        }
    };

    Alert {
        id: Uuid::new_v4(),
        location: observation.location.clone(),
        flood_timeframe,
        countdown_millis: classification.countdown_millis(),
        severity: classification.severity,
        risk_level: classification.risk_level,
        expected_rainfall: snapshot.rainfall_24h,
        current_conditions: observation.conditions.clone(),
        prediction_snapshot: snapshot.clone(),
        preparation_guidance: guidance,
        created_at: now,
        is_active: true,
    }
}

fn hours_to_duration(hours: f64) -> Duration {
    if hours.is_finite() {
        Duration::from_secs_f64(hours.clamp(0.0, MAX_HOURS) * 3600.0)
    } else {
        Duration::ZERO
    }
}
