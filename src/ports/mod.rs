use async_trait::async_trait;
use crate::domain::{Alert, LocationKey, NotificationTask, PredictionSnapshot, TaskHandle};

#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Fetch a flood prediction for a coordinate.
    /// Errors are treated as transient by callers: the tick is skipped and
    /// the previous alert state retained.
    async fn get_prediction(&self, latitude: f64, longitude: f64) -> anyhow::Result<PredictionSnapshot>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Submit a task for delivery at `task.trigger_at` (now if immediate or past).
    /// Success means accepted by the sink, not delivered.
    async fn submit(&self, task: &NotificationTask) -> anyhow::Result<TaskHandle>;

    /// Cancel a previously submitted task. Cancelling an unknown or already
    /// fired handle is not an error.
    async fn cancel(&self, handle: &TaskHandle) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish data to a specific topic.
    /// QoS 1 implied.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Receives every alert store mutation: `Some` on upsert, `None` on clear.
///
/// Called synchronously while the store holds the write gate for `key`, so
/// implementations must be quick and must not write to the store for the
/// same key. Reads are fine. Anything slow belongs behind a channel; see
/// `AlertEventBus::subscribe_channel`.
pub trait AlertSubscriber: Send + Sync {
    fn on_alert(&self, key: &LocationKey, alert: Option<&Alert>);
}

impl<F> AlertSubscriber for F
where
    F: Fn(&LocationKey, Option<&Alert>) + Send + Sync,
{
    fn on_alert(&self, key: &LocationKey, alert: Option<&Alert>) {
        self(key, alert)
    }
}
