pub mod alert_forwarder;
pub mod mqtt;
pub mod notification_sink;
pub mod prediction_http;
pub mod tracing_sink;
pub use alert_forwarder::run_alert_forwarder;
pub use mqtt::MqttAdapter;
pub use notification_sink::BrokerNotificationSink;
pub use prediction_http::HttpPredictionProvider;
pub use tracing_sink::TracingNotificationSink;
