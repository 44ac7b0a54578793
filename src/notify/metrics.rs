//! Prometheus counters for captured errors and notification delivery.

use prometheus::{Counter, CounterVec, Opts, Registry};

use super::payload::TransportKind;
use crate::error::NotificationError;

/// Prometheus metrics for the error notifier.
pub struct Metrics {
    /// Registry for all metrics.
    registry: Registry,
    /// Errors captured, by source (`http`, `scheduled_job`).
    pub errors_captured_total: CounterVec,
    /// Webhook deliveries, by outcome (`sent`, `failed`).
    pub notifications_total: CounterVec,
    /// Client errors that were answered but not escalated.
    pub http_errors_suppressed_total: Counter,
}

impl Metrics {
    /// Creates a new metrics instance with its own registry.
    pub fn new() -> Result<Self, NotificationError> {
        Self::with_registry(Registry::new())
    }

    /// Creates the metrics and registers them with `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, NotificationError> {
        let errors_captured_total = CounterVec::new(
            Opts::new("slack_errors_captured_total", "Errors captured for notification"),
            &["source"],
        )
        .map_err(prometheus_failed)?;

        let notifications_total = CounterVec::new(
            Opts::new("slack_notifications_total", "Slack webhook deliveries"),
            &["outcome"],
        )
        .map_err(prometheus_failed)?;

        let http_errors_suppressed_total = Counter::new(
            "slack_http_errors_suppressed_total",
            "Client errors answered without a notification",
        )
        .map_err(prometheus_failed)?;

        registry
            .register(Box::new(errors_captured_total.clone()))
            .map_err(prometheus_failed)?;
        registry
            .register(Box::new(notifications_total.clone()))
            .map_err(prometheus_failed)?;
        registry
            .register(Box::new(http_errors_suppressed_total.clone()))
            .map_err(prometheus_failed)?;

        Ok(Self {
            registry,
            errors_captured_total,
            notifications_total,
            http_errors_suppressed_total,
        })
    }

    /// Records an error captured from `kind`.
    pub fn record_captured(&self, kind: TransportKind) {
        let source = kind.to_string();
        self.errors_captured_total
            .with_label_values(&[source.as_str()])
            .inc();
    }

    /// Records the outcome of one webhook delivery.
    pub fn record_delivery(&self, sent: bool) {
        let outcome = if sent { "sent" } else { "failed" };
        self.notifications_total.with_label_values(&[outcome]).inc();
    }

    /// Records a client error that was not escalated.
    pub fn record_suppressed(&self) {
        self.http_errors_suppressed_total.inc();
    }

    /// Returns the metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, NotificationError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(prometheus_failed)?;
        String::from_utf8(buffer).map_err(|e| NotificationError::PrometheusFailed(e.to_string()))
    }
}

fn prometheus_failed(e: prometheus::Error) -> NotificationError {
    NotificationError::PrometheusFailed(e.to_string())
}
