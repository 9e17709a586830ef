use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Location, LocationKey, MonitoringSession};
use crate::ports::PredictionProvider;
use crate::service::processor::{AlertProcessor, Observation};

struct SessionEntry {
    session: MonitoringSession,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One polling task per monitored location.
///
/// Sessions are independent: a stalled fetch only delays its own location.
/// Stopping a session cancels its token and waits for its task to exit, so
/// no tick for that key can run once `stop_monitoring` has returned.
pub struct LocationMonitor {
    provider: Arc<dyn PredictionProvider>,
    processor: Arc<AlertProcessor>,
    sessions: Arc<DashMap<LocationKey, SessionEntry>>,
    poll_interval: Duration,
    generation: AtomicU64,
}

impl LocationMonitor {
    pub fn new(provider: Arc<dyn PredictionProvider>, processor: Arc<AlertProcessor>, poll_interval: Duration) -> Self {
        Self {
            provider,
            processor,
            sessions: Arc::new(DashMap::new()),
            poll_interval,
            generation: AtomicU64::new(0),
        }
    }

    /// Starts (or restarts) monitoring and returns once the first evaluation
    /// has run. An existing session for the same key is replaced.
    pub async fn start_monitoring(&self, location: Location) -> MonitoringSession {
        let key = location.key();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let session = MonitoringSession {
            location_key: key.clone(),
            location: location.clone(),
            active: true,
            started_at: OffsetDateTime::now_utc(),
            last_error: None,
            generation,
        };

        let (first_tick_tx, first_tick_rx) = oneshot::channel();
        let ctx = SessionContext {
            key: key.clone(),
            location,
            generation,
            cancel: cancel.clone(),
            provider: self.provider.clone(),
            processor: self.processor.clone(),
            sessions: self.sessions.clone(),
        };
        let spawn = || tokio::spawn(run_session(ctx, self.poll_interval, first_tick_tx));

        // The entry lock is held across the swap so two concurrent starts for
        // one key cannot both leave a timer running.
        let replaced = match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                slot.get().cancel.cancel();
                let task = spawn();
                let old = slot.insert(SessionEntry {
                    session: session.clone(),
                    cancel,
                    task,
                });
                Some(old)
            }
            Entry::Vacant(slot) => {
                let task = spawn();
                slot.insert(SessionEntry {
                    session: session.clone(),
                    cancel,
                    task,
                });
                None
            }
        };

        if let Some(old) = replaced {
            info!(location = %key, previous_generation = old.session.generation, "Replacing monitoring session");
            let _ = old.task.await;
        } else {
            info!(location = %key, generation, "Monitoring started");
        }
        metrics::gauge!("monitor_active_sessions", self.sessions.len() as f64);

        // Err means the session was replaced or stopped before its first tick.
        let _ = first_tick_rx.await;
        self.session(&key).unwrap_or(session)
    }

    /// Stops monitoring `key`, clears its alert and withdraws pending
    /// reminders. Returns `false` if it was not being monitored.
    pub async fn stop_monitoring(&self, key: &LocationKey) -> bool {
        let Some((_, entry)) = self.sessions.remove(key) else {
            return false;
        };

        entry.cancel.cancel();
        if let Err(e) = entry.task.await {
            warn!(location = %key, "Monitoring task ended abnormally: {:?}", e);
        }
        self.processor.dismiss(key).await;

        metrics::gauge!("monitor_active_sessions", self.sessions.len() as f64);
        info!(location = %key, generation = entry.session.generation, "Monitoring stopped");
        true
    }

    pub async fn stop_all(&self) -> usize {
        let keys: Vec<LocationKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut stopped = 0;
        for key in keys {
            if self.stop_monitoring(&key).await {
                stopped += 1;
            }
        }
        stopped
    }

    pub fn session(&self, key: &LocationKey) -> Option<MonitoringSession> {
        self.sessions.get(key).map(|entry| entry.session.clone())
    }

    pub fn sessions(&self) -> Vec<MonitoringSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|entry| entry.session.clone()).collect();
        sessions.sort_by(|a, b| a.location_key.cmp(&b.location_key));
        sessions
    }

    pub fn is_monitoring(&self, key: &LocationKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Everything a session task needs, owned so the task can outlive the call
/// that spawned it.
struct SessionContext {
    key: LocationKey,
    location: Location,
    generation: u64,
    cancel: CancellationToken,
    provider: Arc<dyn PredictionProvider>,
    processor: Arc<AlertProcessor>,
    sessions: Arc<DashMap<LocationKey, SessionEntry>>,
}

async fn run_session(ctx: SessionContext, period: Duration, first_tick: oneshot::Sender<()>) {
    ctx.tick().await;
    let _ = first_tick.send(());

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = ticker.tick() => ctx.tick().await,
        }
    }
    debug!(location = %ctx.key, generation = ctx.generation, "Session loop exited");
}

impl SessionContext {
    #[instrument(skip(self), fields(location = %self.key, generation = self.generation))]
    async fn tick(&self) {
        let started = std::time::Instant::now();

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            result = self.provider.get_prediction(self.location.latitude, self.location.longitude) => result,
        };

        match fetched {
            Err(e) => {
                warn!("Prediction fetch failed, keeping previous alert state: {:?}", e);
                metrics::counter!("prediction_fetch_errors_total", 1);
                self.record_error(Some(format!("{:#}", e)));
            }
            Ok(snapshot) => {
                self.record_error(None);
                let outcome = self
                    .processor
                    .process(Observation::live(self.location.clone(), snapshot), Some(&self.cancel))
                    .await;
                debug!(?outcome, "Tick evaluated");
            }
        }

        metrics::histogram!("monitor_tick_duration_seconds", started.elapsed().as_secs_f64());
    }

    fn record_error(&self, error: Option<String>) {
        if let Some(mut entry) = self.sessions.get_mut(&self.key) {
            if entry.session.generation == self.generation {
                entry.session.last_error = error;
            }
        }
    }
}
