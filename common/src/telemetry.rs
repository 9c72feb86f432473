// Telemetry module for structured logging and metrics

use crate::models::JobId;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured JSON logging with an environment-driven filter
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level, "Structured logging initialized");
    Ok(())
}

/// Install the Prometheus metrics exporter and register engine metrics.
///
/// The stall and cancel-failure paths raise no error to any caller, so these
/// counters are the only place those outcomes become visible.
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("job_triggered_total", "Total number of job firings");
    describe_counter!(
        "chain_stalled_total",
        "Invocation chains stalled by a failed placement"
    );
    describe_counter!(
        "schedule_cancel_failed_total",
        "Gateway cancellations that failed and were absorbed locally"
    );
    describe_histogram!(
        "capacity_probe_attempts",
        "Backoff candidates tried per capacity probe"
    );
    describe_gauge!("jobs_active", "Jobs whose chain may still place invocations");

    tracing::info!(metrics_port, "Prometheus metrics exporter initialized");
    Ok(())
}

/// Record one successful job firing
#[inline]
pub fn record_job_triggered(job_id: JobId) {
    counter!("job_triggered_total", "job_id" => job_id.to_string()).increment(1);
}

/// Record a chain stall, labeled by the placement stage that failed
#[inline]
pub fn record_chain_stalled(job_id: JobId, stage: &'static str) {
    counter!(
        "chain_stalled_total",
        "job_id" => job_id.to_string(),
        "stage" => stage
    )
    .increment(1);
}

/// Record a gateway cancel failure that did not block the local cancel
#[inline]
pub fn record_cancel_failure(job_id: JobId) {
    counter!("schedule_cancel_failed_total", "job_id" => job_id.to_string()).increment(1);
}

/// Record how many backoff candidates a probe consumed
#[inline]
pub fn record_probe_attempts(attempts: u32) {
    histogram!("capacity_probe_attempts").record(f64::from(attempts));
}

/// Adjust the count of jobs with a live chain
#[inline]
pub fn adjust_active_jobs(delta: f64) {
    gauge!("jobs_active").increment(delta);
}
