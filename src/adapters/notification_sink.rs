use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::domain::{NotificationTask, TaskHandle};
use crate::ports::{MessageBroker, NotificationSink};

pub fn notification_topic(prefix: &str, task: &NotificationTask) -> String {
    format!("{}/locations/{}/notifications", prefix, task.metadata.location_key)
}

/// Delivers notification tasks as broker messages.
///
/// Immediate tasks are published inside `submit`. Deferred ones are held by a
/// timer task until their trigger time and can be withdrawn until then.
pub struct BrokerNotificationSink {
    broker: Arc<dyn MessageBroker>,
    topic_prefix: String,
    deferred: Arc<DashMap<TaskHandle, CancellationToken>>,
}

impl BrokerNotificationSink {
    pub fn new(broker: Arc<dyn MessageBroker>, topic_prefix: impl Into<String>) -> Self {
        Self {
            broker,
            topic_prefix: topic_prefix.into(),
            deferred: Arc::new(DashMap::new()),
        }
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }
}

#[async_trait]
impl NotificationSink for BrokerNotificationSink {
    #[instrument(skip(self, task), fields(title = %task.title, alert_id = %task.metadata.alert_id))]
    async fn submit(&self, task: &NotificationTask) -> anyhow::Result<TaskHandle> {
        let handle = TaskHandle::generate();
        let topic = notification_topic(&self.topic_prefix, task);
        let payload = serde_json::to_vec(task)?;

        let now = OffsetDateTime::now_utc();
        let Some(trigger_at) = task.trigger_at.deferred_until(now) else {
            self.broker.publish(&topic, payload).await?;
            return Ok(handle);
        };

        let delay = std::time::Duration::try_from(trigger_at - now).unwrap_or_default();
        let cancel = CancellationToken::new();
        self.deferred.insert(handle.clone(), cancel.clone());

        let broker = self.broker.clone();
        let deferred = self.deferred.clone();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(handle = %task_handle, "Deferred notification withdrawn");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = broker.publish(&topic, payload).await {
                        error!(handle = %task_handle, "Deferred notification publish failed: {:?}", e);
                    }
                }
            }
            deferred.remove(&task_handle);
        });

        debug!(handle = %handle, delay_secs = delay.as_secs(), "Notification deferred");
        Ok(handle)
    }

    async fn cancel(&self, handle: &TaskHandle) -> anyhow::Result<()> {
        if let Some((_, cancel)) = self.deferred.remove(handle) {
            cancel.cancel();
        }
        Ok(())
    }
}
