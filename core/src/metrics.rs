//! This module defines the relay metrics and the Prometheus exporter that
//! serves them.
//!
use std::{net::SocketAddr, sync::LazyLock};

use metrics::{Counter, Gauge};
use metrics_derive::Metrics;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::{config::TelemetryConfig, errors::RelayError};

#[derive(Metrics)]
#[metrics(scope = "light_relay")]
/// Relay progress and submission outcomes.
pub struct RelayMetrics {
    #[metric(describe = "The latest difficulty epoch proven to the relay")]
    pub current_epoch: Gauge,
    #[metric(describe = "Number of headers required on each side of a retarget")]
    pub proof_length: Gauge,
    #[metric(describe = "Number of accepted difficulty proofs")]
    pub retargets_accepted: Counter,
    #[metric(describe = "Number of rejected header submissions")]
    pub submissions_rejected: Counter,
    #[metric(describe = "The block height of the chain as seen by Bitcoin Core RPC")]
    pub rpc_tip_height: Gauge,
}

/// The relay metrics static for the running process.
pub static RELAY_METRICS: LazyLock<RelayMetrics> = LazyLock::new(|| {
    RelayMetrics::describe();
    RelayMetrics::default()
});

/// Starts serving metrics over HTTP. Must be called inside a Tokio runtime.
pub fn install_prometheus_exporter(telemetry: &TelemetryConfig) -> Result<(), RelayError> {
    let addr: SocketAddr = format!("{}:{}", telemetry.host, telemetry.port)
        .parse()
        .map_err(|e| RelayError::ConfigError(format!("Invalid telemetry address: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| eyre::eyre!("Failed to install Prometheus exporter: {e}"))?;

    tracing::info!("Serving metrics on {addr}");
    Ok(())
}
