use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use crate::ports::MessageBroker;
use tracing::instrument;
use std::time::Duration;
use crate::config::AppConfig;

pub struct MqttAdapter {
    client: AsyncClient,
}

impl MqttAdapter {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    /// Builds the client and its event loop. The event loop must be polled
    /// (see `run_control_loop`) for publishes to go out.
    pub fn build(config: &AppConfig) -> (AsyncClient, EventLoop) {
        // Stable client id so the broker keeps our subscription across restarts
        let client_id = format!("{}_{}", config.mqtt_client_id_prefix, config.instance_id);

        let mut mqttoptions = MqttOptions::new(client_id, &config.mqtt_host, config.mqtt_port);
        if let (Some(username), Some(password)) = (&config.mqtt_username, &config.mqtt_password) {
            mqttoptions.set_credentials(username, password);
        }
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(false);

        AsyncClient::new(mqttoptions, 256)
    }
}

#[async_trait]
impl MessageBroker for MqttAdapter {
    #[instrument(skip(self, payload), fields(topic = %topic, payload_size = payload.len()))]
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| anyhow::anyhow!("MQTT Publish Failed: {:?}", e))?;
        Ok(())
    }
}
