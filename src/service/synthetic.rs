//! Synthetic alerts for demos and tests.
//!
//! Builds an observation from a chosen probability and lead time instead of
//! asking the prediction provider, then hands it to the same
//! `AlertProcessor` the live monitor uses. Only the inputs are synthetic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::domain::{Confidence, CurrentConditions, Location, PredictionSnapshot};
use crate::error::PipelineError;
use crate::service::classifier::CountdownBasis;
use crate::service::processor::{AlertProcessor, Observation, TickOutcome};

pub const SYNTHETIC_MODEL_VERSION: &str = "synthetic-v1";

pub struct SyntheticAlertGenerator {
    processor: Arc<AlertProcessor>,
    rng: Mutex<StdRng>,
}

impl SyntheticAlertGenerator {
    /// `seed` makes the synthesized conditions reproducible.
    pub fn new(processor: Arc<AlertProcessor>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            processor,
            rng: Mutex::new(rng),
        }
    }

    /// Runs a synthetic observation through the live pipeline: store, event
    /// bus and scheduler included. Below-threshold probabilities clear.
    pub async fn generate(
        &self,
        probability: f64,
        lead_time_hours: f64,
        location: Location,
    ) -> Result<TickOutcome, PipelineError> {
        let observation = self.synthesize(probability, lead_time_hours, location)?;
        info!(
            location = %observation.location.key(),
            probability,
            lead_time_hours,
            "Generating synthetic alert"
        );
        Ok(self.processor.process(observation, None).await)
    }

    /// Weather-like conditions scaled by probability, with bounded jitter.
    pub fn synthesize(
        &self,
        probability: f64,
        lead_time_hours: f64,
        location: Location,
    ) -> Result<Observation, PipelineError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(PipelineError::InvalidProbability(probability));
        }
        if !lead_time_hours.is_finite() || lead_time_hours < 0.0 {
            return Err(PipelineError::InvalidLeadTime(lead_time_hours));
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        // Rainfall tops out around 70mm, below the heavy-rain cutoff, so a
        // synthetic alert's severity is always driven by its lead time.
        let rainfall = (5.0 + probability * 60.0 + rng.gen_range(-5.0..=5.0)).max(0.0);
        let humidity = (55.0 + probability * 40.0 + rng.gen_range(-3.0..=3.0)).clamp(0.0, 100.0);
        let river_discharge = (150.0 + probability * 1350.0) * rng.gen_range(0.9..=1.1);
        let temperature = rng.gen_range(8.0..=22.0);
        drop(rng);

        let snapshot = PredictionSnapshot {
            probability,
            timeframe_hours: lead_time_hours,
            confidence: Confidence::Score(0.7 + 0.25 * probability),
            rainfall_24h: rainfall,
            current_temp: temperature,
            model_version: SYNTHETIC_MODEL_VERSION.to_string(),
            humidity: Some(humidity),
            expected_duration_hours: Some(2.0 + probability * 10.0),
        };

        Ok(Observation {
            location,
            snapshot,
            basis: CountdownBasis::LeadTime,
            conditions: CurrentConditions {
                rainfall,
                temperature,
                humidity: Some(humidity),
                river_discharge: Some(river_discharge),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::domain::{NotificationPriority, RiskLevel, Severity};
    use crate::service::guidance::guidance_for;
    use crate::service::scheduler::tests::RecordingSink;
    use crate::service::scheduler::{NotificationScheduler, SchedulerConfig};
    use crate::state::{AlertEventBus, AlertStore, ConfigManager};
    use std::time::Duration;

    fn generator(seed: u64) -> (SyntheticAlertGenerator, Arc<RecordingSink>, Arc<AlertStore>) {
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(AlertStore::new(Arc::new(AlertEventBus::new())));
        let processor = Arc::new(AlertProcessor::new(
            store.clone(),
            Arc::new(NotificationScheduler::new(sink.clone(), SchedulerConfig::default())),
            Arc::new(ConfigManager::new(&PipelineSettings::default())),
        ));
        (SyntheticAlertGenerator::new(processor, Some(seed)), sink, store)
    }

    fn havana() -> Location {
        Location::new("Havana", 40.30, -90.06)
    }

    #[tokio::test]
    async fn test_happening_now_scenario() {
        let (gen, sink, store) = generator(7);
        let outcome = gen.generate(0.9, 0.0, havana()).await.unwrap();

        let alert = outcome.alert().expect("alert raised");
        assert_eq!(alert.severity, Severity::Immediate);
        assert_eq!(alert.countdown_millis, 0);
        let tasks = sink.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, NotificationPriority::Max);
        assert_eq!(store.get(&havana().key()).unwrap().id, alert.id);
    }

    #[tokio::test]
    async fn test_six_hour_lead_is_urgent_with_reminder() {
        let (gen, sink, _) = generator(7);
        let outcome = gen.generate(0.65, 6.0, havana()).await.unwrap();

        let alert = outcome.alert().expect("alert raised");
        assert_eq!(alert.severity, Severity::Urgent);
        assert_eq!(alert.risk_level, RiskLevel::High);
        assert_eq!(alert.countdown_millis, 6 * 3_600_000);
        assert_eq!(sink.tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_low_probability_raises_nothing() {
        let (gen, sink, store) = generator(7);
        for lead in [0.0, 3.0, 48.0] {
            let outcome = gen.generate(0.2, lead, havana()).await.unwrap();
            assert_eq!(outcome, TickOutcome::Quiet);
        }
        assert!(store.get(&havana().key()).is_none());
        assert!(sink.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_inputs() {
        let (gen, _, store) = generator(7);
        assert_eq!(
            gen.generate(1.2, 1.0, havana()).await,
            Err(PipelineError::InvalidProbability(1.2))
        );
        assert_eq!(
            gen.generate(0.9, -1.0, havana()).await,
            Err(PipelineError::InvalidLeadTime(-1.0))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_conditions_scale_with_probability() {
        let (gen, _, _) = generator(42);
        let low = gen.synthesize(0.1, 12.0, havana()).unwrap().conditions;
        let high = gen.synthesize(0.9, 12.0, havana()).unwrap().conditions;
        assert!(high.rainfall > low.rainfall);
        assert!(high.humidity > low.humidity);
        assert!(high.river_discharge > low.river_discharge);
        assert!(high.humidity.unwrap() <= 100.0);
    }

    #[test]
    fn test_same_seed_reproduces_conditions() {
        let (a, _, _) = generator(99);
        let (b, _, _) = generator(99);
        assert_eq!(
            a.synthesize(0.7, 4.0, havana()).unwrap(),
            b.synthesize(0.7, 4.0, havana()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_matches_live_severity_and_guidance_tables() {
        let (gen, _, _) = generator(3);
        let boundaries = PipelineSettings::default().classifier.severity;
        for lead in [1.0, 4.0, 9.0, 30.0] {
            let outcome = gen.generate(0.75, lead, havana()).await.unwrap();
            let alert = outcome.alert().unwrap();
            let expected = boundaries.severity_for(Duration::from_secs_f64(lead * 3600.0));
            assert_eq!(alert.severity, expected, "lead {}h", lead);
            assert_eq!(alert.preparation_guidance, guidance_for(expected));
        }
    }
}
