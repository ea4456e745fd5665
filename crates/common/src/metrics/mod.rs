//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Bookshelf metrics
pub const METRICS_PREFIX: &str = "bookshelf";

/// Histogram buckets for request and remote call latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Remote platform / metadata calls
    describe_counter!(
        format!("{}_remote_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total calls made to remote services"
    );

    describe_histogram!(
        format!("{}_remote_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Remote call latency in seconds"
    );

    // Cleanup
    describe_counter!(
        format!("{}_orphaned_blobs_total", METRICS_PREFIX),
        Unit::Count,
        "Cover images left behind by a failed best-effort cleanup"
    );

    // Sessions
    describe_counter!(
        format!("{}_auth_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Login and registration attempts"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one call to a remote service
pub fn record_remote_call(service: &str, operation: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_remote_calls_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_remote_call_duration_seconds", METRICS_PREFIX),
        "service" => service.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record a cover image that could not be cleaned up
pub fn record_orphaned_blob(operation: &str) {
    counter!(
        format!("{}_orphaned_blobs_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a login or registration outcome
pub fn record_auth(action: &str, success: bool) {
    counter!(
        format!("{}_auth_attempts_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/v1/books");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_recorders_without_exporter() {
        record_remote_call("platform", "get_document", 0.01, true);
        record_orphaned_blob("delete");
        record_auth("login", false);
    }
}
