//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain health and submissions
//! - Transfer lifecycle outcomes
//! - Consensus and validator participation
//! - Security rejections and emergency state

use crate::error::{BridgeError, BridgeResult};
use crate::ledger::TransactionStatus;
use crate::types::TransferKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_HEALTHY: GaugeVec = register_gauge_vec!(
        "bridge_chain_healthy",
        "Chain health status (1=healthy, 0=unreachable)",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_SUBMISSIONS: CounterVec = register_counter_vec!(
        "bridge_chain_submissions_total",
        "Total contract calls submitted by kind",
        &["chain_id", "kind"]
    ).unwrap();

    // Transfer metrics
    pub static ref TRANSFERS_INITIATED: CounterVec = register_counter_vec!(
        "bridge_transfers_initiated_total",
        "Total transfers accepted into the ledger",
        &["kind"]
    ).unwrap();

    pub static ref TRANSFERS_COMPLETED: CounterVec = register_counter_vec!(
        "bridge_transfers_completed_total",
        "Total transfers that reached a terminal status",
        &["status"]
    ).unwrap();

    pub static ref PROCESSING_LATENCY: HistogramVec = register_histogram_vec!(
        "bridge_processing_latency_seconds",
        "Time from initiation to terminal status",
        &["kind"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]
    ).unwrap();

    pub static ref PENDING_TRANSACTIONS: Gauge = register_gauge!(
        "bridge_pending_transactions",
        "Transactions currently pending"
    ).unwrap();

    // Consensus metrics
    pub static ref ATTESTATIONS: Counter = register_counter!(
        "bridge_attestations_total",
        "Total validator attestations accepted"
    ).unwrap();

    pub static ref ACTIVE_VALIDATORS: Gauge = register_gauge!(
        "bridge_active_validators",
        "Validators currently allowed to attest"
    ).unwrap();

    // Security metrics
    pub static ref SECURITY_REJECTIONS: CounterVec = register_counter_vec!(
        "bridge_security_rejections_total",
        "Total transfers rejected by the security policy",
        &["reason"]
    ).unwrap();

    pub static ref EMERGENCY_MODE: Gauge = register_gauge!(
        "bridge_emergency_mode",
        "Emergency mode status (1=active, 0=normal)"
    ).unwrap();

    pub static ref BRIDGE_PAUSED: Gauge = register_gauge!(
        "bridge_paused",
        "Bridge pause status (1=paused, 0=active)"
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

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Config(format!("Cannot bind metrics port {}: {}", self.port, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

pub(crate) async fn metrics_handler() -> (StatusCode, String) {
    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_HEALTHY
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_chain_submission(chain_id: u64, kind: TransferKind) {
    CHAIN_SUBMISSIONS
        .with_label_values(&[&chain_id.to_string(), kind.as_str()])
        .inc();
}

pub fn record_transfer_initiated(kind: TransferKind) {
    TRANSFERS_INITIATED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_transaction_completed(status: TransactionStatus) {
    TRANSFERS_COMPLETED
        .with_label_values(&[status.as_str()])
        .inc();
}

pub fn record_processing_latency(kind: TransferKind, latency_secs: f64) {
    PROCESSING_LATENCY
        .with_label_values(&[kind.as_str()])
        .observe(latency_secs);
}

pub fn record_pending_transactions(count: u64) {
    PENDING_TRANSACTIONS.set(count as f64);
}

pub fn record_attestation() {
    ATTESTATIONS.inc();
}

pub fn record_active_validators(count: usize) {
    ACTIVE_VALIDATORS.set(count as f64);
}

pub fn record_security_rejection(reason: &'static str) {
    SECURITY_REJECTIONS.with_label_values(&[reason]).inc();
}

pub fn record_emergency_mode(active: bool) {
    EMERGENCY_MODE.set(if active { 1.0 } else { 0.0 });
}

pub fn record_bridge_paused(paused: bool) {
    BRIDGE_PAUSED.set(if paused { 1.0 } else { 0.0 });
}
