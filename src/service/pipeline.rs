use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::PipelineSettings;
use crate::domain::{Alert, Location, LocationKey, MonitoringSession};
use crate::error::PipelineError;
use crate::ports::{AlertSubscriber, NotificationSink, PredictionProvider};
use crate::service::classifier::{RiskThresholds, SeverityBoundaries};
use crate::service::monitor::LocationMonitor;
use crate::service::processor::AlertProcessor;
use crate::service::scheduler::NotificationScheduler;
use crate::service::synthetic::SyntheticAlertGenerator;
use crate::state::{AlertEvent, AlertEventBus, AlertStore, ConfigManager, RuntimeSettings, SubscriptionId};

/// The control surface. One instance per process (or per test), wired once
/// and shared by reference.
pub struct AlertPipeline {
    bus: Arc<AlertEventBus>,
    store: Arc<AlertStore>,
    config: Arc<ConfigManager>,
    processor: Arc<AlertProcessor>,
    monitor: LocationMonitor,
    synthetic: SyntheticAlertGenerator,
}

impl AlertPipeline {
    pub fn new(
        settings: &PipelineSettings,
        provider: Arc<dyn PredictionProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let bus = Arc::new(AlertEventBus::new());
        let store = Arc::new(AlertStore::new(bus.clone()));
        let config = Arc::new(ConfigManager::new(settings));
        let scheduler = Arc::new(NotificationScheduler::new(sink, settings.scheduler));
        let processor = Arc::new(AlertProcessor::new(store.clone(), scheduler, config.clone()));

        Self {
            monitor: LocationMonitor::new(provider, processor.clone(), settings.poll_interval),
            synthetic: SyntheticAlertGenerator::new(processor.clone(), settings.synthetic_seed),
            processor,
            bus,
            store,
            config,
        }
    }

    /// Returns after the first evaluation for `location` has run.
    pub async fn start_monitoring(&self, location: Location) -> MonitoringSession {
        self.monitor.start_monitoring(location).await
    }

    /// No tick for `location` runs after this returns, and its alert is gone.
    pub async fn stop_monitoring(&self, location: &Location) -> bool {
        self.monitor.stop_monitoring(&location.key()).await
    }

    /// Clears the live alert and its pending reminders. Monitoring carries on,
    /// so the next qualifying tick raises a fresh alert.
    pub async fn dismiss_alert(&self, location: &Location) -> Option<Alert> {
        self.processor.dismiss(&location.key()).await
    }

    pub fn get_active_alert(&self, location: &Location) -> Option<Alert> {
        self.store.get(&location.key())
    }

    pub fn list_active_alerts(&self) -> Vec<Alert> {
        self.store.list_all()
    }

    pub fn set_alert_trigger_threshold(&self, value: f64) -> Result<(), PipelineError> {
        self.config.set_alert_trigger_threshold(value)
    }

    /// Disabling also withdraws every reminder still pending.
    pub async fn set_alerts_enabled(&self, enabled: bool) {
        let was_enabled = self.config.set_alerts_enabled(enabled);
        if was_enabled && !enabled {
            let cancelled = self.processor.withdraw_notifications().await;
            info!(cancelled, "Pending reminders withdrawn");
        }
    }

    pub fn set_severity_boundaries(&self, boundaries: SeverityBoundaries) -> Result<(), PipelineError> {
        self.config.set_severity_boundaries(boundaries)
    }

    pub fn set_risk_thresholds(&self, thresholds: RiskThresholds) -> Result<(), PipelineError> {
        self.config.set_risk_thresholds(thresholds)
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.config.snapshot()
    }

    /// `Ok(None)` when `probability` is below the trigger threshold.
    pub async fn generate_synthetic_alert(
        &self,
        probability: f64,
        lead_time_hours: f64,
        location: Location,
    ) -> Result<Option<Alert>, PipelineError> {
        let outcome = self.synthetic.generate(probability, lead_time_hours, location).await?;
        Ok(outcome.alert().cloned())
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&LocationKey, Option<&Alert>) + Send + Sync + 'static,
    {
        self.bus.subscribe_fn(f)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<AlertEvent>) {
        self.bus.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn sessions(&self) -> Vec<MonitoringSession> {
        self.monitor.sessions()
    }

    pub fn session(&self, location: &Location) -> Option<MonitoringSession> {
        self.monitor.session(&location.key())
    }

    /// Stops every session. Reminders for cleared alerts are withdrawn too.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.monitor.stop_all().await;
        info!(stopped, "Pipeline shut down");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PredictionSnapshot, Severity};
    use crate::service::scheduler::tests::RecordingSink;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Same prediction for every location; probability can be changed mid-test.
    struct FixedProvider {
        probability: Mutex<f64>,
        timeframe_hours: f64,
    }

    #[async_trait]
    impl PredictionProvider for FixedProvider {
        async fn get_prediction(&self, _latitude: f64, _longitude: f64) -> anyhow::Result<PredictionSnapshot> {
            Ok(PredictionSnapshot {
                probability: *self.probability.lock().unwrap(),
                timeframe_hours: self.timeframe_hours,
                rainfall_24h: 30.0,
                current_temp: 15.0,
                model_version: "fixed".into(),
                ..Default::default()
            })
        }
    }

    fn pipeline(probability: f64, timeframe_hours: f64) -> (AlertPipeline, Arc<FixedProvider>, Arc<RecordingSink>) {
        let provider = Arc::new(FixedProvider {
            probability: Mutex::new(probability),
            timeframe_hours,
        });
        let sink = Arc::new(RecordingSink::default());
        let settings = PipelineSettings {
            poll_interval: Duration::from_secs(60),
            synthetic_seed: Some(11),
            ..Default::default()
        };
        (AlertPipeline::new(&settings, provider.clone(), sink.clone()), provider, sink)
    }

    fn grafton() -> Location {
        Location::new("Grafton", 38.9681, -90.4290)
    }

    fn alton() -> Location {
        Location::new("Alton", 38.8906, -90.1843)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_monitoring_raises_and_notifies_subscribers() {
        let (pipeline, _, sink) = pipeline(0.85, 20.0);
        let (_, mut rx) = pipeline.subscribe_channel();

        let session = pipeline.start_monitoring(grafton()).await;
        assert!(session.active);

        let alert = pipeline.get_active_alert(&grafton()).expect("alert raised");
        assert_eq!(alert.severity, Severity::Urgent); // 5h preparation window
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, grafton().key());
        assert_eq!(event.alert.map(|a| a.id), Some(alert.id));
        assert_eq!(sink.tasks().len(), 2);

        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_monitoring_clears_alert_and_reminders() {
        let (pipeline, _, sink) = pipeline(0.85, 20.0);
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = events.clone();
        pipeline.subscribe_fn(move |key: &LocationKey, alert: Option<&Alert>| {
            recorder.lock().unwrap().push((key.clone(), alert.is_some()));
        });

        pipeline.start_monitoring(grafton()).await;
        assert!(pipeline.stop_monitoring(&grafton()).await);
        assert!(!pipeline.stop_monitoring(&grafton()).await);

        assert!(pipeline.get_active_alert(&grafton()).is_none());
        assert!(pipeline.session(&grafton()).is_none());
        assert_eq!(sink.cancelled.lock().unwrap().len(), 1);
        assert_eq!(events.lock().unwrap().last(), Some(&(grafton().key(), false)));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(pipeline.get_active_alert(&grafton()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_keeps_monitoring() {
        let (pipeline, _, _) = pipeline(0.9, 0.0);
        pipeline.start_monitoring(grafton()).await;

        let dismissed = pipeline.dismiss_alert(&grafton()).await;
        assert!(dismissed.is_some());
        assert!(pipeline.get_active_alert(&grafton()).is_none());
        assert!(pipeline.session(&grafton()).is_some());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(pipeline.get_active_alert(&grafton()).is_some());
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_locations_are_tracked_independently() {
        let (pipeline, provider, _) = pipeline(0.9, 0.0);
        pipeline.start_monitoring(grafton()).await;
        pipeline.start_monitoring(alton()).await;
        assert_eq!(pipeline.list_active_alerts().len(), 2);
        assert_eq!(pipeline.sessions().len(), 2);

        *provider.probability.lock().unwrap() = 0.1;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(pipeline.list_active_alerts().is_empty());

        assert_eq!(pipeline.shutdown().await, 2);
        assert!(pipeline.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_disabling_alerts_withdraws_pending_reminders() {
        let (pipeline, _, sink) = pipeline(0.0, 0.0);
        pipeline.generate_synthetic_alert(0.7, 10.0, grafton()).await.unwrap();
        assert_eq!(sink.tasks().len(), 2);

        pipeline.set_alerts_enabled(false).await;
        assert_eq!(sink.cancelled.lock().unwrap().len(), 1);
        assert!(!pipeline.settings().alerts_enabled);

        // still tracked, just not notified
        pipeline.generate_synthetic_alert(0.9, 0.0, alton()).await.unwrap();
        assert!(pipeline.get_active_alert(&alton()).is_some());
        assert_eq!(sink.tasks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenabling_alerts_notifies_ongoing_flood() {
        let (pipeline, _, sink) = pipeline(0.9, 0.0);
        pipeline.set_alerts_enabled(false).await;
        pipeline.start_monitoring(grafton()).await;
        assert!(pipeline.get_active_alert(&grafton()).is_some());
        assert!(sink.tasks().is_empty());

        pipeline.set_alerts_enabled(true).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        let tasks = sink.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].metadata.severity, Severity::Immediate);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.tasks().len(), 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_threshold_rejection_keeps_previous_value() {
        let (pipeline, _, _) = pipeline(0.0, 0.0);
        assert!(pipeline.set_alert_trigger_threshold(0.95).is_err());
        assert_eq!(pipeline.settings().alert_trigger_threshold, 0.6);

        pipeline.set_alert_trigger_threshold(0.3).unwrap();
        let alert = pipeline.generate_synthetic_alert(0.35, 30.0, grafton()).await.unwrap();
        assert_eq!(alert.map(|a| a.severity), Some(Severity::Advisory));
    }

    #[tokio::test]
    async fn test_synthetic_alert_reaches_subscribers_and_store() {
        let (pipeline, _, _) = pipeline(0.0, 0.0);
        let (id, mut rx) = pipeline.subscribe_channel();

        let alert = pipeline
            .generate_synthetic_alert(0.65, 6.0, grafton())
            .await
            .unwrap()
            .expect("alert raised");
        assert_eq!(rx.recv().await.unwrap().alert.map(|a| a.id), Some(alert.id));
        assert_eq!(pipeline.list_active_alerts(), vec![alert]);

        assert!(pipeline.unsubscribe(id));
        assert_eq!(pipeline.generate_synthetic_alert(0.2, 6.0, grafton()).await, Ok(None));
        assert!(pipeline.get_active_alert(&grafton()).is_none());
    }

    #[tokio::test]
    async fn test_tuned_severity_boundaries_apply_to_next_alert() {
        let (pipeline, _, _) = pipeline(0.0, 0.0);
        let bad = SeverityBoundaries {
            immediate_hours: 8.0,
            urgent_hours: 6.0,
            warning_hours: 12.0,
        };
        assert!(pipeline.set_severity_boundaries(bad).is_err());

        pipeline
            .set_severity_boundaries(SeverityBoundaries {
                immediate_hours: 1.0,
                urgent_hours: 3.0,
                warning_hours: 24.0,
            })
            .unwrap();
        let alert = pipeline.generate_synthetic_alert(0.8, 6.0, grafton()).await.unwrap().unwrap();
        assert_eq!(alert.severity, Severity::Warning);
    }
}
