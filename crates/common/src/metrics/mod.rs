//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all SectorSite metrics
pub const METRICS_PREFIX: &str = "sectorsite";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
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

    // Tenancy metrics
    describe_counter!(
        format!("{}_tenant_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Tenant resolutions by outcome"
    );

    describe_counter!(
        format!("{}_stale_resolutions_discarded_total", METRICS_PREFIX),
        Unit::Count,
        "Resolution results dropped because a newer navigation superseded them"
    );

    // Vault metrics
    describe_counter!(
        format!("{}_decrypt_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Stored fields that could not be decrypted on read"
    );

    // Subscription metrics
    describe_counter!(
        format!("{}_limit_denials_total", METRICS_PREFIX),
        Unit::Count,
        "Actions refused by the usage-limit gate"
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

/// Count one tenant resolution by outcome
pub fn record_resolution(outcome: &str) {
    counter!(
        format!("{}_tenant_resolutions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_stale_discard() {
    counter!(format!("{}_stale_resolutions_discarded_total", METRICS_PREFIX)).increment(1);
}

pub fn record_decrypt_failure() {
    counter!(format!("{}_decrypt_failures_total", METRICS_PREFIX)).increment(1);
}

/// Count one gate denial by limited resource
pub fn record_limit_denial(resource: &str) {
    counter!(
        format!("{}_limit_denials_total", METRICS_PREFIX),
        "resource" => resource.to_string()
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

        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.250));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // no recorder installed: every call is a no-op
        register_metrics();
        RequestMetrics::start("GET", "/api/v1/resolve").finish(200);
        record_resolution("resolved");
        record_stale_discard();
        record_decrypt_failure();
        record_limit_denial("items");
    }
}
