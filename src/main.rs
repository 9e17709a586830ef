use flood_alert_pipeline::adapters::{
    run_alert_forwarder, BrokerNotificationSink, HttpPredictionProvider, MqttAdapter,
};
use flood_alert_pipeline::config::AppConfig;
use flood_alert_pipeline::service::control::run_control_loop;
use flood_alert_pipeline::service::AlertPipeline;
use flood_alert_pipeline::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize Structured Logging
    telemetry::init_tracing();
    info!("Starting flood alert pipeline...");

    // 2. Load Configuration
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            std::process::exit(1);
        }
    };
    info!(
        locations = config.monitored_locations.len(),
        poll_secs = config.pipeline.poll_interval.as_secs(),
        "Configuration loaded."
    );

    // 3. Metrics
    telemetry::install_metrics_exporter(config.metrics_port)?;

    // 4. Adapters
    let (mqtt_client, eventloop) = MqttAdapter::build(&config);
    let broker = Arc::new(MqttAdapter::new(mqtt_client.clone()));
    let provider = Arc::new(HttpPredictionProvider::new(&config.prediction_api_url)?);
    let sink = Arc::new(BrokerNotificationSink::new(broker.clone(), config.topic_prefix.clone()));

    // 5. Pipeline
    let pipeline = Arc::new(AlertPipeline::new(&config.pipeline, provider, sink));

    let (forwarder_sub, alert_events) = pipeline.subscribe_channel();
    let forwarder_handle = tokio::spawn(run_alert_forwarder(
        alert_events,
        broker.clone(),
        config.topic_prefix.clone(),
    ));

    // 6. MQTT Control Loop (also drives outgoing publishes)
    let pipeline_for_mqtt = pipeline.clone();
    let prefix = config.topic_prefix.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = run_control_loop(eventloop, mqtt_client, pipeline_for_mqtt, prefix).await {
            error!("MQTT Loop Error: {:?}", e);
        }
    });

    // 7. Monitor configured locations
    for location in config.monitored_locations.clone() {
        let session = pipeline.start_monitoring(location).await;
        info!(location = %session.location_key, "Monitoring {}", session.location.name);
    }

    info!("System Running. Press Ctrl+C to stop.");

    // 8. Shutdown Signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown Signal Received..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    // 9. Graceful Shutdown: clear alerts while MQTT is still up so the
    // retractions reach subscribers.
    pipeline.shutdown().await;
    pipeline.unsubscribe(forwarder_sub);

    match tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await {
        Ok(_) => info!("Alert forwarder drained."),
        Err(_) => warn!("Timeout waiting for alert forwarder."),
    }

    mqtt_handle.abort();
    info!("Shutdown Complete.");

    Ok(())
}
