//! Lightweight metrics helpers for Switchyard.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros. No exporter is embedded: the
//! application can install any compatible recorder, and without one every
//! call is a no-op.
//!
//! Provided metrics (labels vary by family):
//! * `switchyard_requests_total` (counter; route, method, status)
//! * `switchyard_request_duration_seconds` (histogram; method)
//! * `switchyard_upstream_requests_total` (counter; upstream, method, status)
//! * `switchyard_upstream_request_duration_seconds` (histogram; upstream, method)
//! * `switchyard_forward_failures_total` (counter; kind)
//!
//! The `*Timer` structs leverage `Drop` to record durations even when early
//! returns or errors occur.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const SWITCHYARD_REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const SWITCHYARD_REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";
pub const SWITCHYARD_UPSTREAM_REQUESTS_TOTAL: &str = "switchyard_upstream_requests_total";
pub const SWITCHYARD_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "switchyard_upstream_request_duration_seconds";
pub const SWITCHYARD_FORWARD_FAILURES_TOTAL: &str = "switchyard_forward_failures_total";

/// Route label used when no route matched.
pub const UNMATCHED_ROUTE: &str = "<none>";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        SWITCHYARD_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        SWITCHYARD_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        SWITCHYARD_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to upstream services."
    );
    describe_histogram!(
        SWITCHYARD_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests forwarded to upstream services."
    );
    describe_counter!(
        SWITCHYARD_FORWARD_FAILURES_TOTAL,
        Unit::Count,
        "Requests that failed inside the gateway, by failure kind."
    );
});

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(route: &str, method: &str, status: u16) {
    counter!(
        SWITCHYARD_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(method: &str, duration: Duration) {
    histogram!(
        SWITCHYARD_REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of requests sent upstream (502/504 for transport failures).
pub fn increment_upstream_request_total(upstream: &str, method: &str, status: u16) {
    counter!(
        SWITCHYARD_UPSTREAM_REQUESTS_TOTAL,
        "upstream" => upstream.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed upstream request duration.
pub fn record_upstream_request_duration(upstream: &str, method: &str, duration: Duration) {
    histogram!(
        SWITCHYARD_UPSTREAM_REQUEST_DURATION_SECONDS,
        "upstream" => upstream.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count a gateway-side failure by its kind (`no_route_matched`, ...).
pub fn increment_forward_failure(kind: &'static str) {
    counter!(SWITCHYARD_FORWARD_FAILURES_TOTAL, "kind" => kind).increment(1);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.method, self.start.elapsed());
    }
}

/// RAII helper measuring upstream request duration.
pub struct UpstreamRequestTimer {
    start: Instant,
    upstream: String,
    method: String,
}

impl UpstreamRequestTimer {
    pub fn new(upstream: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            upstream: upstream.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for UpstreamRequestTimer {
    fn drop(&mut self) {
        record_upstream_request_duration(&self.upstream, &self.method, self.start.elapsed());
    }
}

/// Register metric descriptions with the installed recorder (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("Switchyard metric descriptions registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_record_on_drop() {
        let timer = RequestTimer::new("GET");
        drop(timer);
        let timer = UpstreamRequestTimer::new("http://person-service:8080", "POST");
        drop(timer);
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_counters_without_recorder() {
        increment_request_total("person", "GET", 200);
        increment_upstream_request_total("http://person-service:8080", "GET", 200);
        increment_forward_failure("no_route_matched");
    }
}
