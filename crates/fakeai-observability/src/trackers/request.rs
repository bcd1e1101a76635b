//! Per-endpoint request rate, response rate, error rate and latency percentiles.

use std::sync::Mutex;

use dashmap::DashMap;

use crate::window::MetricsWindow;

struct EndpointWindows {
    requests: MetricsWindow,
    responses: MetricsWindow,
    errors: MetricsWindow,
    latencies_ms: Mutex<Vec<f64>>,
}

impl EndpointWindows {
    fn new() -> Self {
        Self {
            requests: MetricsWindow::new(60),
            responses: MetricsWindow::new(60),
            errors: MetricsWindow::new(60),
            latencies_ms: Mutex::new(Vec::new()),
        }
    }
}

/// Snapshot returned to readers; a copy, never a live reference.
#[derive(Debug, Clone)]
pub struct RequestStats {
    pub endpoint: String,
    pub rps: f64,
    pub response_rate: f64,
    pub error_rate: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

#[derive(Default)]
pub struct RequestTracker {
    endpoints: DashMap<String, EndpointWindows>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self, endpoint: &str, now_ms: i64) {
        let windows = self.endpoints.entry(endpoint.to_string()).or_insert_with(EndpointWindows::new);
        windows.requests.record(now_ms, 1.0);
    }

    pub fn record_completed(&self, endpoint: &str, now_ms: i64, duration_ms: f64, is_error: bool) {
        let windows = self.endpoints.entry(endpoint.to_string()).or_insert_with(EndpointWindows::new);
        windows.responses.record(now_ms, 1.0);
        if is_error {
            windows.errors.record(now_ms, 1.0);
        }
        let mut latencies = windows.latencies_ms.lock().expect("request tracker mutex poisoned");
        latencies.push(duration_ms);
        const MAX_RETAINED_LATENCIES: usize = 10_000;
        if latencies.len() > MAX_RETAINED_LATENCIES {
            let excess = latencies.len() - MAX_RETAINED_LATENCIES;
            latencies.drain(0..excess);
        }
    }

    pub fn stats(&self, endpoint: &str, now_ms: i64) -> Option<RequestStats> {
        let windows = self.endpoints.get(endpoint)?;
        let rps = windows.requests.rate(now_ms);
        let response_rate = windows.responses.rate(now_ms);
        let error_rate = windows.errors.rate(now_ms);

        let latencies = windows.latencies_ms.lock().expect("request tracker mutex poisoned");
        let percentile = |p: f64| -> f64 {
            if latencies.is_empty() {
                return 0.0;
            }
            let mut sorted = latencies.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let len = sorted.len();
            if len < 20 {
                return sorted[len - 1];
            }
            let rank = ((p / 100.0) * len as f64).ceil() as usize;
            sorted[rank.clamp(1, len) - 1]
        };

        Some(RequestStats {
            endpoint: endpoint.to_string(),
            rps,
            response_rate,
            error_rate,
            p50_ms: percentile(50.0),
            p90_ms: percentile(90.0),
            p99_ms: percentile(99.0),
        })
    }

    pub fn all_endpoints(&self) -> Vec<String> {
        self.endpoints.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_request_and_response_rates_independently() {
        let tracker = RequestTracker::new();
        tracker.record_started("/v1/chat/completions", 0);
        tracker.record_completed("/v1/chat/completions", 10, 25.0, false);

        let stats = tracker.stats("/v1/chat/completions", 10).unwrap();
        assert!(stats.rps > 0.0);
        assert!(stats.response_rate > 0.0);
        assert_eq!(stats.error_rate, 0.0);
    }

    #[test]
    fn unknown_endpoint_returns_none() {
        let tracker = RequestTracker::new();
        assert!(tracker.stats("/nope", 0).is_none());
    }
}
