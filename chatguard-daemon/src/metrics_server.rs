//! Prometheus exporter for the chatguard counters.
//!
//! Every pipeline metric carries a `source` label, so one scrape covers all
//! watched log files. The model latency histogram
//! (`chatguard_model_call_duration_seconds`) gets buckets sized to the
//! moderation gate: most calls finish in a few seconds and the gate gives up
//! at its timeout, so the upper buckets stop at 30s.

use std::net::SocketAddr;

use anyhow::Result;
use chatguard_core::config::MetricsConfig;
use chatguard_core::metrics as m;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Histogram buckets for model call latency, in seconds.
const MODEL_LATENCY_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0];

/// The exporter's built-in listener only serves this path.
const SUPPORTED_ENDPOINT: &str = "/metrics";

/// Resolve the address the exporter should bind to.
fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != SUPPORTED_ENDPOINT {
        anyhow::bail!(
            "unsupported metrics endpoint '{}': the exporter serves '{}' only",
            config.endpoint,
            SUPPORTED_ENDPOINT
        );
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global recorder and start serving `/metrics`.
///
/// Only one recorder can exist per process, so the orchestrator calls this
/// once before any pipeline is built. Metric descriptions (including the
/// daemon uptime and source-count gauges) are registered right after.
///
/// # Errors
///
/// - `endpoint` is anything other than `/metrics`
/// - `listen_addr`/`port` do not form a socket address
/// - the port cannot be bound, or a recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_address(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics listener bound to all interfaces, source names are visible to any scraper"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(m::MODEL_CALL_DURATION_SECONDS.to_owned()),
            MODEL_LATENCY_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid model latency buckets: {}", e))?
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "metrics exporter listening");
    Ok(())
}
