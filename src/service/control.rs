use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::domain::Location;
use crate::error::PipelineError;
use crate::service::pipeline::AlertPipeline;

/// Commands accepted on `{prefix}/control`.
///
/// ```json
/// {"action": "START_MONITORING", "location": {"name": "Peoria", "latitude": 40.69, "longitude": -89.59}}
/// {"action": "SET_THRESHOLD", "value": 0.7}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    StartMonitoring { location: Location },
    StopMonitoring { location: Location },
    Dismiss { location: Location },
    SetThreshold { value: f64 },
    SetAlertsEnabled { enabled: bool },
    Synthetic {
        probability: f64,
        lead_time_hours: f64,
        location: Location,
    },
}

pub fn control_topic(prefix: &str) -> String {
    format!("{}/control", prefix)
}

pub fn parse_command(payload: &[u8]) -> anyhow::Result<ControlCommand> {
    Ok(serde_json::from_slice(payload)?)
}

/// Applies one command. Rejections leave the pipeline unchanged.
#[instrument(skip(pipeline))]
pub async fn execute(pipeline: &AlertPipeline, command: ControlCommand) -> Result<(), PipelineError> {
    match command {
        ControlCommand::StartMonitoring { location } => {
            let session = pipeline.start_monitoring(location).await;
            info!(location = %session.location_key, generation = session.generation, "Monitoring started via control topic");
        }
        ControlCommand::StopMonitoring { location } => {
            if !pipeline.stop_monitoring(&location).await {
                warn!(location = %location.key(), "Stop requested for a location that is not monitored");
            }
        }
        ControlCommand::Dismiss { location } => {
            pipeline.dismiss_alert(&location).await;
        }
        ControlCommand::SetThreshold { value } => pipeline.set_alert_trigger_threshold(value)?,
        ControlCommand::SetAlertsEnabled { enabled } => pipeline.set_alerts_enabled(enabled).await,
        ControlCommand::Synthetic {
            probability,
            lead_time_hours,
            location,
        } => {
            pipeline
                .generate_synthetic_alert(probability, lead_time_hours, location)
                .await?;
        }
    }
    Ok(())
}

/// Runs commands one at a time, in arrival order.
pub async fn run_command_worker(mut commands: mpsc::Receiver<ControlCommand>, pipeline: Arc<AlertPipeline>) {
    while let Some(command) = commands.recv().await {
        if let Err(e) = execute(&pipeline, command).await {
            warn!("Control command rejected: {}", e);
        }
    }
    info!("Control channel closed. Command worker stopped.");
}

/// Drives the MQTT event loop and feeds control commands to the pipeline.
///
/// Commands run on a separate worker so a slow `START_MONITORING` (which waits
/// for its first prediction) never stalls the event loop that outgoing
/// publishes depend on.
pub async fn run_control_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    pipeline: Arc<AlertPipeline>,
    topic_prefix: String,
) -> anyhow::Result<()> {
    let topic = control_topic(&topic_prefix);
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run_command_worker(rx, pipeline));

    client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
    info!(%topic, "MQTT control loop started");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != topic {
                    continue;
                }
                match parse_command(&publish.payload) {
                    Ok(command) => {
                        if let Err(e) = tx.try_send(command) {
                            warn!("Control command dropped: {}", e);
                        }
                    }
                    Err(e) => error!("Invalid control payload: {:?}", e),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected. Resubscribing to {}", topic);
                client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT Error: {:?}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
