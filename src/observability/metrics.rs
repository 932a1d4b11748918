//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, breaker transitions, retry queue, sagas)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_breaker_transitions_total` (counter): state changes per dependency
//! - `gateway_breaker_rejections_total` (counter): calls denied by an open breaker
//! - `gateway_retry_tasks_enqueued_total` (counter): deferred operations by reason
//! - `gateway_retry_attempts_total` (counter): dispatcher attempts by outcome
//! - `gateway_retry_tasks_discarded_total` (counter): tasks dropped after the last attempt
//! - `gateway_retry_queue_depth` (gauge): tasks currently queued
//! - `gateway_saga_outcomes_total` (counter): saga results by saga and outcome
//! - `gateway_rating_update_failures_total` (counter): lost rating adjustments
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed
//! - Labels stay low-cardinality (no user names or UIDs)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels[..2]).record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_transition(dependency: &str, to: &str) {
    counter!(
        "gateway_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_breaker_rejection(dependency: &str) {
    counter!("gateway_breaker_rejections_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_retry_enqueued(reason: &'static str) {
    counter!("gateway_retry_tasks_enqueued_total", "reason" => reason).increment(1);
}

pub fn record_retry_attempt(outcome: &'static str) {
    counter!("gateway_retry_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry_discarded() {
    counter!("gateway_retry_tasks_discarded_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("gateway_retry_queue_depth").set(depth as f64);
}

pub fn record_saga_outcome(saga: &'static str, outcome: &'static str) {
    counter!("gateway_saga_outcomes_total", "saga" => saga, "outcome" => outcome).increment(1);
}

pub fn record_rating_update_failure() {
    counter!("gateway_rating_update_failures_total").increment(1);
}
