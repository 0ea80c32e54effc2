//! Metrics recording helpers over the `metrics` facade.
//!
//! No-ops unless the embedding application installs a recorder.

use std::time::Duration;

/// Record a dispatched load for a demand class.
pub fn record_dispatch(class: &str) {
    metrics::counter!("request_pool_dispatch_total", "class" => class.to_string()).increment(1);
}

/// Record a request coalesced into an already in-flight load.
pub fn record_coalesced(class: &str) {
    metrics::counter!("request_pool_coalesced_total", "class" => class.to_string()).increment(1);
}

/// Record a completed load with its latency and outcome.
pub fn record_load_completed(class: &str, latency: Duration, failed: bool) {
    let outcome = if failed { "failure" } else { "success" };
    metrics::counter!(
        "request_pool_load_total",
        "class" => class.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    metrics::histogram!("request_pool_load_duration_seconds", "class" => class.to_string())
        .record(latency.as_secs_f64());
}

/// Record the current pending queue depth for a class.
pub fn record_queue_depth(class: &str, depth: usize) {
    metrics::gauge!("request_pool_queue_depth", "class" => class.to_string()).set(depth as f64);
}
