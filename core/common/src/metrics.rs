// core/common/src/metrics.rs
// Prometheus metrics collection

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Instant;

/// Service-wide metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub errors_total: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry, service_name: &str) -> Result<Self, prometheus::Error> {
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .namespace(service_name),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace(service_name)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors").namespace(service_name),
            &["type", "operation"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
        })
    }

    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, duration: f64) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();

        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration);
    }

    pub fn record_error(&self, error_type: &str, operation: &str) {
        self.errors_total
            .with_label_values(&[error_type, operation])
            .inc();
    }
}

/// Timer to measure operation duration
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for MetricsTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Repayment flow metrics
#[derive(Clone)]
pub struct RepaymentMetrics {
    pub otp_requests_total: IntCounterVec,
    pub payments_initiated_total: IntCounterVec,
    pub payment_polls_total: IntCounterVec,
    pub repayments_recorded_total: IntCounterVec,
    pub duplicate_settlements_total: IntCounter,
    pub settlement_conflicts_total: IntCounter,
}

impl RepaymentMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let otp_requests_total = IntCounterVec::new(
            Opts::new("otp_requests_total", "OTP send/verify requests by outcome"),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(otp_requests_total.clone()))?;

        let payments_initiated_total = IntCounterVec::new(
            Opts::new("payments_initiated_total", "Payment initiations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(payments_initiated_total.clone()))?;

        let payment_polls_total = IntCounterVec::new(
            Opts::new("payment_polls_total", "Payment status polls by gateway status"),
            &["status"],
        )?;
        registry.register(Box::new(payment_polls_total.clone()))?;

        let repayments_recorded_total = IntCounterVec::new(
            Opts::new("repayments_recorded_total", "Repayments written to the ledger"),
            &["source"],
        )?;
        registry.register(Box::new(repayments_recorded_total.clone()))?;

        let duplicate_settlements_total = IntCounter::new(
            "duplicate_settlements_total",
            "Settlements skipped because the payment was already recorded",
        )?;
        registry.register(Box::new(duplicate_settlements_total.clone()))?;

        let settlement_conflicts_total = IntCounter::new(
            "settlement_conflicts_total",
            "Settlements rejected because remaining payments changed concurrently",
        )?;
        registry.register(Box::new(settlement_conflicts_total.clone()))?;

        Ok(Self {
            otp_requests_total,
            payments_initiated_total,
            payment_polls_total,
            repayments_recorded_total,
            duplicate_settlements_total,
            settlement_conflicts_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        let registry = Registry::new();
        let metrics = ServiceMetrics::new(&registry, "test_service").unwrap();

        metrics.record_http_request("GET", "/schedule", 200, 0.1);

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "test_service_http_requests_total"));
    }

    #[test]
    fn test_record_error() {
        let registry = Registry::new();
        let metrics = ServiceMetrics::new(&registry, "test_service").unwrap();

        metrics.record_error("server_error", "/payments/{payment_id}");

        assert_eq!(
            metrics
                .errors_total
                .with_label_values(&["server_error", "/payments/{payment_id}"])
                .get(),
            1
        );
    }

    #[test]
    fn test_repayment_metrics_counters() {
        let registry = Registry::new();
        let metrics = RepaymentMetrics::new(&registry).unwrap();

        metrics
            .repayments_recorded_total
            .with_label_values(&["gateway"])
            .inc();
        metrics.duplicate_settlements_total.inc();

        assert_eq!(
            metrics
                .repayments_recorded_total
                .with_label_values(&["gateway"])
                .get(),
            1
        );
        assert_eq!(metrics.duplicate_settlements_total.get(), 1);
    }

    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_seconds() >= 0.01);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();

        assert!(RepaymentMetrics::new(&registry).is_ok());
        assert!(RepaymentMetrics::new(&registry).is_err());
    }
}
