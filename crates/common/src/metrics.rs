//! Metrics collection for FinServe
//!
//! This module provides Prometheus metrics for observability.
//! All metrics are designed to minimize overhead in the hot path.

use lazy_static::lazy_static;
use prometheus::{Histogram, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for FinServe
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub requests: RequestMetrics,
}

/// Request-related metrics
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Total number of prediction requests
    pub requests_total: IntCounter,

    /// Total number of successful requests
    pub requests_success: IntCounter,

    /// Total number of failed requests
    pub requests_failed: IntCounter,

    /// Connections rejected at capacity
    pub rejected_total: IntCounter,

    /// End-to-end request duration histogram
    pub request_duration: Histogram,

    /// Forward pass duration histogram
    pub predict_duration: Histogram,

    /// Current active connections
    pub active_connections: IntGauge,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounter::new(
            "finserve_requests_total",
            "Total number of prediction requests",
        )
        .unwrap();

        let requests_success = IntCounter::new(
            "finserve_requests_success_total",
            "Total number of successful prediction requests",
        )
        .unwrap();

        let requests_failed = IntCounter::new(
            "finserve_requests_failed_total",
            "Total number of failed prediction requests",
        )
        .unwrap();

        let rejected_total = IntCounter::new(
            "finserve_connections_rejected_total",
            "Connections rejected because the worker pool was full",
        )
        .unwrap();

        let request_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "finserve_request_duration_seconds",
                "End-to-end request duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )
        .unwrap();

        let predict_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "finserve_predict_duration_seconds",
                "Forward pass duration in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
            ]),
        )
        .unwrap();

        let active_connections = IntGauge::new(
            "finserve_active_connections",
            "Current number of active connections",
        )
        .unwrap();

        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(requests_success.clone())).unwrap();
        registry.register(Box::new(requests_failed.clone())).unwrap();
        registry.register(Box::new(rejected_total.clone())).unwrap();
        registry.register(Box::new(request_duration.clone())).unwrap();
        registry.register(Box::new(predict_duration.clone())).unwrap();
        registry.register(Box::new(active_connections.clone())).unwrap();

        let requests = RequestMetrics {
            requests_total,
            requests_success,
            requests_failed,
            rejected_total,
            request_duration,
            predict_duration,
            active_connections,
        };

        MetricsRegistry { registry, requests }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry() {
        let metrics = MetricsRegistry::new();

        metrics.requests.requests_total.inc();
        metrics.requests.active_connections.set(3);
        metrics.requests.request_duration.observe(0.012);

        let output = metrics.gather();
        assert!(output.contains("finserve_requests_total"));
        assert!(output.contains("finserve_active_connections"));
    }
}
