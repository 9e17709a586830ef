use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    // Explicitly set default info if RUST_LOG is empty
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default().with(env_filter).with(fmt_layer).init();
}

/// Serves Prometheus metrics on `0.0.0.0:{port}`. Series idle for a minute
/// are dropped so stopped locations do not linger.
pub fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .idle_timeout(metrics_util::MetricKindMask::ALL, Some(Duration::from_secs(60)))
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {:?}", e))?;
    tracing::info!("Prometheus metrics listening on 0.0.0.0:{}", port);
    Ok(())
}
