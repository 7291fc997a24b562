//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (requests, latency, upstream failures, staging)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, mode, status
//! - `relay_request_duration_seconds` (histogram): latency distribution
//! - `relay_upstream_failures_total` (counter): failed forwards by kind
//! - `relay_staged_files_total` (counter): files written to the upload dir
//! - `relay_cleanup_failures_total` (counter): staged files left behind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality: no paths, no backend URLs

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

/// Record one completed relay cycle.
pub fn record_request(method: &str, mode: &'static str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("mode", mode.to_string()),
        ("status", status.to_string()),
    ];
    counter!("relay_requests_total", &labels).increment(1);
    histogram!("relay_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_failure(kind: &'static str) {
    counter!("relay_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn record_staged_files(count: usize) {
    if count > 0 {
        counter!("relay_staged_files_total").increment(count as u64);
    }
}

pub fn record_cleanup_failures(count: usize) {
    if count > 0 {
        counter!("relay_cleanup_failures_total").increment(count as u64);
    }
}
