//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain lifecycle
//! - Routed and unroutable messages

use crate::core::{RSymbol, Reason};
use crate::error::{RelayerError, RelayerResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref CHAIN_RUNNING: GaugeVec = register_gauge_vec!(
        "rtoken_relay_chain_running",
        "Chain lifecycle status (1=started, 0=stopped)",
        &["rsymbol"]
    ).unwrap();

    pub static ref MESSAGES_ROUTED: CounterVec = register_counter_vec!(
        "rtoken_relay_messages_routed_total",
        "Messages dispatched to a destination handler",
        &["source", "destination", "reason"]
    ).unwrap();

    pub static ref ROUTE_FAILURES: CounterVec = register_counter_vec!(
        "rtoken_relay_route_failures_total",
        "Messages dropped because the destination had no handler",
        &["destination"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RelayerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayerError::Internal(format!("metrics bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RelayerError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    gather().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn gather() -> RelayerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RelayerError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| RelayerError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_chain_started(symbol: &RSymbol) {
    CHAIN_RUNNING.with_label_values(&[symbol.as_str()]).set(1.0);
}

pub fn record_chain_stopped(symbol: &RSymbol) {
    CHAIN_RUNNING.with_label_values(&[symbol.as_str()]).set(0.0);
}

pub fn record_message_routed(source: &RSymbol, destination: &RSymbol, reason: Reason) {
    MESSAGES_ROUTED
        .with_label_values(&[source.as_str(), destination.as_str(), reason.as_str()])
        .inc();
}

pub fn record_route_failure(destination: &RSymbol) {
    ROUTE_FAILURES
        .with_label_values(&[destination.as_str()])
        .inc();
}
