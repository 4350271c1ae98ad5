// Telemetry module for structured logging, metrics, and cycle correlation

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Process-wide cycle counter used to correlate log lines of one cycle.
static CYCLE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Take the next cycle number. Monotonic across all triggers.
pub fn next_cycle_id() -> u64 {
    CYCLE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over `log_level`.
pub fn init_logging(log_level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, format = ?format, "Structured logging initialized");

    Ok(())
}

/// Install the Prometheus exporter and describe the trigger metrics.
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("filesfound_cycles_total", "Evaluation cycles started");
    describe_counter!(
        "filesfound_cycles_skipped_total",
        "Fires coalesced because a cycle was still running"
    );
    describe_counter!(
        "filesfound_cycles_interrupted_total",
        "Cycles ended by shutdown before a decision"
    );
    describe_counter!("filesfound_triggers_total", "Builds scheduled by a trigger");
    describe_counter!(
        "filesfound_search_failures_total",
        "Searches that failed or were interrupted"
    );
    describe_counter!(
        "filesfound_schedule_failures_total",
        "Builds that met their threshold but could not be scheduled"
    );
    describe_histogram!(
        "filesfound_search_duration_seconds",
        "Duration of a single search"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

#[inline]
pub fn record_cycle(job: &str) {
    counter!("filesfound_cycles_total", "job" => job.to_string()).increment(1);
}

#[inline]
pub fn record_cycle_skipped(job: &str) {
    counter!("filesfound_cycles_skipped_total", "job" => job.to_string()).increment(1);
}

#[inline]
pub fn record_cycle_interrupted(job: &str) {
    counter!("filesfound_cycles_interrupted_total", "job" => job.to_string()).increment(1);
}

#[inline]
pub fn record_trigger(job: &str) {
    counter!("filesfound_triggers_total", "job" => job.to_string()).increment(1);
}

#[inline]
pub fn record_search_failure(kind: &'static str) {
    counter!("filesfound_search_failures_total", "kind" => kind).increment(1);
}

#[inline]
pub fn record_schedule_failure(job: &str) {
    counter!("filesfound_schedule_failures_total", "job" => job.to_string()).increment(1);
}

#[inline]
pub fn record_search_duration(duration_seconds: f64) {
    histogram!("filesfound_search_duration_seconds").record(duration_seconds);
}
