//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_forward_transfers_total` (counter): by strategy, outcome
//! - `proxy_forward_transfer_duration_seconds` (histogram): by strategy
//! - `proxy_forward_body_bytes` (histogram): bytes delivered per response
//! - `proxy_forward_date_fallbacks_total` (counter): unformattable `Date`
//! - `proxy_forward_releases_total` (counter): origin streams drained,
//!   dropped or aborted
//! - `proxy_forward_upstream_errors_total` (counter): failed upstream fetches
//! - `proxy_forward_exchange_resets_total` (counter): upstream fetches reset
//!   after a failed transfer
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

pub fn record_transfer(strategy: &'static str, outcome: &'static str, bytes: u64, started: Instant) {
    metrics::counter!("proxy_forward_transfers_total", "strategy" => strategy, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("proxy_forward_transfer_duration_seconds", "strategy" => strategy)
        .record(started.elapsed().as_secs_f64());
    if outcome == "success" {
        metrics::histogram!("proxy_forward_body_bytes").record(bytes as f64);
    }
}

pub fn record_date_fallback() {
    metrics::counter!("proxy_forward_date_fallbacks_total").increment(1);
}

pub fn record_release(action: &'static str) {
    metrics::counter!("proxy_forward_releases_total", "action" => action).increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("proxy_forward_upstream_errors_total").increment(1);
}

pub fn record_exchange_reset() {
    metrics::counter!("proxy_forward_exchange_resets_total").increment(1);
}
