//! Request-pipeline counters exposed at `/metrics`. A single [`Metrics`]
//! instance is resolved as an ordinary singleton bean and threaded through
//! the pipeline explicitly — no process-wide static, per the framework's
//! rule against global mutable state.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

#[derive(Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    responses_2xx: AtomicU64,
    responses_4xx: AtomicU64,
    responses_5xx: AtomicU64,
    unauthorized_total: AtomicU64,
    forbidden_total: AtomicU64,
    total_duration_millis: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self, status: http::StatusCode) {
        match status.as_u16() {
            200..=299 => self.responses_2xx.fetch_add(1, Ordering::Relaxed),
            401 => {
                self.unauthorized_total.fetch_add(1, Ordering::Relaxed);
                self.responses_4xx.fetch_add(1, Ordering::Relaxed)
            }
            403 => {
                self.forbidden_total.fetch_add(1, Ordering::Relaxed);
                self.responses_4xx.fetch_add(1, Ordering::Relaxed)
            }
            400..=499 => self.responses_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.responses_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Folded into the running total `/metrics` divides by the request
    /// count to report `averageResponseTimeMs`.
    pub fn record_duration(&self, elapsed: std::time::Duration) {
        self.total_duration_millis.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "requests_total": self.requests_total.load(Ordering::Relaxed),
            "responses_2xx": self.responses_2xx.load(Ordering::Relaxed),
            "responses_4xx": self.responses_4xx.load(Ordering::Relaxed),
            "responses_5xx": self.responses_5xx.load(Ordering::Relaxed),
            "unauthorized_total": self.unauthorized_total.load(Ordering::Relaxed),
            "forbidden_total": self.forbidden_total.load(Ordering::Relaxed),
        })
    }

    /// The `GET /metrics` response body shape.
    pub fn public_snapshot(&self) -> serde_json::Value {
        let total = self.requests_total.load(Ordering::Relaxed);
        let successful = self.responses_2xx.load(Ordering::Relaxed);
        let failed = self.responses_4xx.load(Ordering::Relaxed) + self.responses_5xx.load(Ordering::Relaxed);
        let average_response_time_ms = if total == 0 {
            0.0
        } else {
            self.total_duration_millis.load(Ordering::Relaxed) as f64 / total as f64
        };
        json!({
            "totalRequests": total,
            "successfulRequests": successful,
            "failedRequests": failed,
            "averageResponseTimeMs": average_response_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests_and_statuses() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_status(http::StatusCode::OK);
        metrics.record_status(http::StatusCode::FORBIDDEN);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["requests_total"], 1);
        assert_eq!(snapshot["responses_2xx"], 1);
        assert_eq!(snapshot["forbidden_total"], 1);
    }

    #[test]
    fn public_snapshot_reports_the_spec_shape() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_status(http::StatusCode::OK);
        metrics.record_duration(std::time::Duration::from_millis(40));
        metrics.record_request();
        metrics.record_status(http::StatusCode::INTERNAL_SERVER_ERROR);
        metrics.record_duration(std::time::Duration::from_millis(60));

        let snapshot = metrics.public_snapshot();
        assert_eq!(snapshot["totalRequests"], 2);
        assert_eq!(snapshot["successfulRequests"], 1);
        assert_eq!(snapshot["failedRequests"], 1);
        assert_eq!(snapshot["averageResponseTimeMs"], 50.0);
    }

    #[test]
    fn public_snapshot_with_no_requests_avoids_division_by_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.public_snapshot()["averageResponseTimeMs"], 0.0);
    }
}
