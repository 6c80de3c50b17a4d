//! Attempt counter and its Prometheus endpoint
//!
//! The capture loop records through the `metrics` facade; the HTTP task only
//! renders the recorder's [`PrometheusHandle`]. Nothing else is shared
//! between the two.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;

pub const COUNTER_NAME: &str = "total_conns_attempts";
pub const COUNTER_HELP: &str = "Number of attempted connections";

/// Install the Prometheus recorder as the process-wide metrics recorder.
pub fn install() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install prometheus recorder")?;
    describe();
    Ok(handle)
}

/// Register the attempt counter so it is exported as 0 before the first packet.
pub fn describe() {
    ::metrics::describe_counter!(COUNTER_NAME, COUNTER_HELP);
    ::metrics::counter!(COUNTER_NAME).increment(0);
}

/// Count one observed connection attempt.
pub fn record_attempt() {
    ::metrics::counter!(COUNTER_NAME).increment(1);
}

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(handle)
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Bind the listener up front so a taken port fails startup, not a background task.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind metrics endpoint on {}", addr))
}

/// Serve `/metrics` and `/health` until the process exits.
pub async fn serve(listener: TcpListener, handle: PrometheusHandle) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("[metrics] listening on http://{}/metrics", addr);
    }
    axum::serve(listener, router(handle))
        .await
        .context("Metrics server stopped")
}
