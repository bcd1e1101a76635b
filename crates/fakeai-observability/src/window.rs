//! Sliding-window rate and percentile computation over timestamped samples.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A single (timestamp_ms, value) sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp_ms: i64,
    value: f64,
}

/// Stores timestamped samples within a trailing window and computes
/// rates and percentiles over the active (non-expired) subset.
pub struct MetricsWindow {
    window_ms: i64,
    samples: Mutex<VecDeque<Sample>>,
}

impl MetricsWindow {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_ms: window_seconds as i64 * 1000,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a sample and evicts anything older than the window relative to `now_ms`.
    pub fn record(&self, now_ms: i64, value: f64) {
        let mut samples = self.samples.lock().expect("metrics window mutex poisoned");
        samples.push_back(Sample { timestamp_ms: now_ms, value });
        Self::evict(&mut samples, now_ms, self.window_ms);
    }

    fn evict(samples: &mut VecDeque<Sample>, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms - window_ms;
        while let Some(front) = samples.front() {
            if front.timestamp_ms < cutoff {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Count of active samples divided by the window length in seconds.
    pub fn rate(&self, now_ms: i64) -> f64 {
        let mut samples = self.samples.lock().expect("metrics window mutex poisoned");
        Self::evict(&mut samples, now_ms, self.window_ms);
        let window_seconds = (self.window_ms as f64 / 1000.0).max(1.0);
        samples.len() as f64 / window_seconds
    }

    /// The `p`-th percentile (0-100) of active sample values.
    ///
    /// Tie-break rule: nearest-rank. Fewer than 20 samples use the max;
    /// for a 100-quantile request with fewer than 100 samples, also use the max.
    pub fn percentile(&self, now_ms: i64, p: f64) -> f64 {
        let mut samples = self.samples.lock().expect("metrics window mutex poisoned");
        Self::evict(&mut samples, now_ms, self.window_ms);

        if samples.is_empty() {
            return 0.0;
        }

        let mut values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let len = values.len();

        if len < 20 || (p >= 100.0 && len < 100) {
            return values[len - 1];
        }

        let rank = ((p / 100.0) * len as f64).ceil() as usize;
        let index = rank.clamp(1, len) - 1;
        values[index]
    }

    pub fn count(&self, now_ms: i64) -> usize {
        let mut samples = self.samples.lock().expect("metrics window mutex poisoned");
        Self::evict(&mut samples, now_ms, self.window_ms);
        samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_reflects_sample_count_within_window() {
        let window = MetricsWindow::new(10);
        for i in 0..5 {
            window.record(i * 100, 1.0);
        }
        assert_eq!(window.count(400), 5);
        assert!(window.rate(400) > 0.0);
    }

    #[test]
    fn samples_outside_window_are_evicted() {
        let window = MetricsWindow::new(1);
        window.record(0, 1.0);
        window.record(5_000, 1.0);
        assert_eq!(window.count(5_000), 1);
    }

    #[test]
    fn small_sample_count_percentile_uses_max() {
        let window = MetricsWindow::new(60);
        for v in [10.0, 30.0, 20.0] {
            window.record(0, v);
        }
        assert_eq!(window.percentile(0, 50.0), 30.0);
    }

    #[test]
    fn large_sample_percentile_uses_nearest_rank() {
        let window = MetricsWindow::new(60);
        for i in 1..=100 {
            window.record(0, i as f64);
        }
        assert_eq!(window.percentile(0, 50.0), 50.0);
        assert_eq!(window.percentile(0, 99.0), 99.0);
    }
}
