use clap::Parser;
use flood_alert_pipeline::adapters::{run_alert_forwarder, BrokerNotificationSink, MqttAdapter, TracingNotificationSink};
use flood_alert_pipeline::config::PipelineSettings;
use flood_alert_pipeline::domain::{Location, PredictionSnapshot};
use flood_alert_pipeline::ports::{MessageBroker, NotificationSink, PredictionProvider};
use flood_alert_pipeline::service::AlertPipeline;
use flood_alert_pipeline::telemetry;
use rumqttc::{AsyncClient, MqttOptions};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Raise a synthetic flood alert", long_about = None)]
struct Args {
    /// Flood probability, 0..=1
    #[arg(long, default_value_t = 0.75)]
    probability: f64,

    /// Hours until expected onset (0 = happening now)
    #[arg(long, default_value_t = 6.0)]
    lead_time_hours: f64,

    #[arg(long, default_value = "Peoria")]
    name: String,

    #[arg(long, default_value_t = 40.6936, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value_t = -89.5890, allow_hyphen_values = true)]
    lng: f64,

    /// Seed for reproducible synthesized conditions
    #[arg(long)]
    seed: Option<u64>,

    /// Publish the alert and its notifications over MQTT instead of logging them
    #[arg(long, default_value_t = false)]
    publish: bool,

    /// MQTT Broker Host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT Broker Port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    #[arg(long, default_value = "flood")]
    topic_prefix: String,
}

/// The synthetic path never consults the provider.
struct NoPredictions;

#[async_trait::async_trait]
impl PredictionProvider for NoPredictions {
    async fn get_prediction(&self, _latitude: f64, _longitude: f64) -> anyhow::Result<PredictionSnapshot> {
        anyhow::bail!("no prediction service in synthetic mode")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init_tracing();

    let settings = PipelineSettings {
        synthetic_seed: args.seed,
        ..Default::default()
    };

    let broker: Option<Arc<dyn MessageBroker>> = if args.publish {
        let client_id = format!("synthetic_alert_{}", uuid::Uuid::new_v4());
        let mut mqttoptions = MqttOptions::new(client_id, &args.host, args.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn Event Loop in background to handle network traffic
        tokio::spawn(async move { while eventloop.poll().await.is_ok() {} });
        Some(Arc::new(MqttAdapter::new(client)))
    } else {
        None
    };

    let sink: Arc<dyn NotificationSink> = match &broker {
        Some(broker) => Arc::new(BrokerNotificationSink::new(broker.clone(), args.topic_prefix.clone())),
        None => Arc::new(TracingNotificationSink),
    };
    let pipeline = AlertPipeline::new(&settings, Arc::new(NoPredictions), sink);

    let forwarder = broker.map(|broker| {
        let (sub, events) = pipeline.subscribe_channel();
        (sub, tokio::spawn(run_alert_forwarder(events, broker, args.topic_prefix.clone())))
    });

    let location = Location::new(args.name, args.lat, args.lng);
    match pipeline
        .generate_synthetic_alert(args.probability, args.lead_time_hours, location)
        .await?
    {
        Some(alert) => println!("{}", serde_json::to_string_pretty(&alert)?),
        None => println!(
            "No alert: probability {} is below the trigger threshold {}",
            args.probability,
            pipeline.settings().alert_trigger_threshold
        ),
    }

    if let Some((sub, handle)) = forwarder {
        pipeline.unsubscribe(sub);
        let _ = handle.await;
        // Give the event loop a moment to flush
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}
