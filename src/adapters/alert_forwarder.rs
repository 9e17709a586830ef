use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::domain::LocationKey;
use crate::ports::MessageBroker;
use crate::state::AlertEvent;

pub fn alert_topic(prefix: &str, key: &LocationKey) -> String {
    format!("{}/locations/{}/alert", prefix, key)
}

/// Mirrors every store change to the broker: the alert as JSON, or `null`
/// once it is cleared. Runs until the bus drops the channel.
pub async fn run_alert_forwarder(
    mut events: mpsc::UnboundedReceiver<AlertEvent>,
    broker: Arc<dyn MessageBroker>,
    topic_prefix: String,
) {
    info!("Alert forwarder started.");
    while let Some(event) = events.recv().await {
        let topic = alert_topic(&topic_prefix, &event.key);
        let payload = match serde_json::to_vec(&event.alert) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize alert for {}: {:?}", event.key, e);
                continue;
            }
        };
        if let Err(e) = broker.publish(&topic, payload).await {
            error!("Failed to forward alert for {}: {:?}", event.key, e);
        }
    }
    info!("Alert channel closed. Forwarder stopped.");
}
