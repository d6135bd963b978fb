//! Metrics collection and exposition.
//!
//! # Metrics
//! - `preview_compiles_total` (counter): compiles by `outcome` (success, failure)
//! - `preview_compile_duration_seconds` (histogram): compile latency
//! - `preview_clients` (gauge): connected live reload clients
//! - `preview_client_evictions_total` (counter): dropped clients by `reason`
//! - `preview_watch_failures_total` (counter): watch setup or event errors
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_compile(success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("preview_compiles_total", "outcome" => outcome).increment(1);
    histogram!("preview_compile_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_clients(count: usize) {
    gauge!("preview_clients").set(count as f64);
}

pub fn record_eviction(reason: &'static str) {
    counter!("preview_client_evictions_total", "reason" => reason).increment(1);
}

pub fn record_watch_failure() {
    counter!("preview_watch_failures_total").increment(1);
}
