//! Metrics recording.
//!
//! # Metrics
//! - `refine_requests_total` (counter): refine calls by outcome
//! - `refine_cache_events_total` (counter): hit / miss / eviction / expiration
//! - `refine_cache_entries` (gauge): current cache size
//! - `refine_breaker_transitions_total` (counter): by backend and target state
//! - `refine_breaker_rejections_total` (counter): by backend
//! - `refine_retry_attempts_total` (counter): retries scheduled, by backend
//! - `refine_backend_instances` (gauge): live backend handles

use metrics::{counter, gauge};

pub fn record_refine_outcome(outcome: &'static str) {
    counter!("refine_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("refine_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("refine_cache_entries").set(size as f64);
}

pub fn record_breaker_transition(backend_id: &str, state: &'static str) {
    counter!(
        "refine_breaker_transitions_total",
        "backend" => backend_id.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_breaker_rejection(backend_id: &str) {
    counter!("refine_breaker_rejections_total", "backend" => backend_id.to_string()).increment(1);
}

pub fn record_retry(backend_id: &str) {
    counter!("refine_retry_attempts_total", "backend" => backend_id.to_string()).increment(1);
}

pub fn record_backend_instances(count: usize) {
    gauge!("refine_backend_instances").set(count as f64);
}
