use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{NotificationTask, TaskHandle, TriggerAt};
use crate::ports::NotificationSink;

/// Logs notification tasks instead of delivering them. Used when no broker
/// is configured, e.g. by the synthetic alert tool.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn submit(&self, task: &NotificationTask) -> anyhow::Result<TaskHandle> {
        let handle = TaskHandle::generate();
        let trigger = match task.trigger_at {
            TriggerAt::Immediate => "now".to_string(),
            TriggerAt::At(at) => at.to_string(),
        };
        info!(
            handle = %handle,
            location = %task.metadata.location_key,
            severity = %task.metadata.severity,
            priority = ?task.priority,
            trigger = %trigger,
            "NOTIFY {}: {}",
            task.title,
            task.body
        );
        Ok(handle)
    }

    async fn cancel(&self, handle: &TaskHandle) -> anyhow::Result<()> {
        debug!(handle = %handle, "Notification cancelled");
        Ok(())
    }
}
